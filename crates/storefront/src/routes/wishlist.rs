//! Wishlist route handlers.

use axum::extract::{Path, State};
use tracing::instrument;

use marketstall_core::ProductId;

use crate::db::{ProductRepository, WishlistRepository};
use crate::error::{ApiResponse, AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::product::Product;
use crate::state::AppState;

/// Products on the signed-in user's wishlist.
///
/// GET /api/wishlist
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<Vec<Product>>> {
    let ids = WishlistRepository::new(state.pool())
        .product_ids(user.id)
        .await?;
    let products = ProductRepository::new(state.pool())
        .get_many_active(&ids)
        .await?;
    Ok(ApiResponse::new(products))
}

/// Add a product. Adding it again is a no-op.
///
/// POST /api/wishlist/{product_id}
#[instrument(skip_all, fields(user_id = %user.id, product_id = %product_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<ApiResponse<serde_json::Value>> {
    let exists = ProductRepository::new(state.pool())
        .get_by_id(product_id)
        .await?
        .is_some_and(|p| p.is_active);
    if !exists {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    let added = WishlistRepository::new(state.pool())
        .add(user.id, product_id)
        .await?;
    Ok(ApiResponse::new(
        serde_json::json!({ "product_id": product_id, "added": added }),
    ))
}

/// Remove a product.
///
/// DELETE /api/wishlist/{product_id}
#[instrument(skip_all, fields(user_id = %user.id, product_id = %product_id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<ApiResponse<serde_json::Value>> {
    let removed = WishlistRepository::new(state.pool())
        .remove(user.id, product_id)
        .await?;
    Ok(ApiResponse::new(
        serde_json::json!({ "product_id": product_id, "removed": removed }),
    ))
}
