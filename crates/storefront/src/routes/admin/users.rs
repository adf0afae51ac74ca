//! User management.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use marketstall_core::{UserId, UserRole};

use crate::db::UserRepository;
use crate::error::{ApiResponse, AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{Page, PageQuery, User};
use crate::state::AppState;

/// Body of `PUT /api/admin/users/{id}/role`.
#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: UserRole,
}

/// GET /api/admin/users
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<Page<User>>> {
    let page = UserRepository::new(state.pool())
        .list(query.page, query.limit)
        .await?;
    Ok(ApiResponse::new(page))
}

/// Grant or revoke admin access. Admins cannot demote themselves.
///
/// PUT /api/admin/users/{id}/role
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, role = %body.role))]
pub async fn update_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Json(body): Json<RoleUpdate>,
) -> Result<ApiResponse<User>> {
    if id == admin.id && body.role != UserRole::Admin {
        return Err(AppError::BadRequest(
            "You cannot remove your own admin role".to_string(),
        ));
    }

    let user = UserRepository::new(state.pool()).set_role(id, body.role).await?;
    tracing::info!(user_id = %id, role = %user.role, "User role changed");

    Ok(ApiResponse::new(user))
}
