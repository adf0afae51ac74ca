//! Customer order route handlers.

use axum::extract::{Path, Query, State};
use tracing::instrument;

use marketstall_core::OrderId;

use crate::db::OrderRepository;
use crate::error::{ApiResponse, AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::order::{Order, OrderDetail};
use crate::models::{Page, PageQuery};
use crate::services::CheckoutService;
use crate::state::AppState;

/// The signed-in user's orders, newest first.
///
/// GET /api/orders
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<Page<Order>>> {
    let page = OrderRepository::new(state.pool())
        .list_for_user(user.id, query.page, query.limit)
        .await?;
    Ok(ApiResponse::new(page))
}

/// One of the signed-in user's orders.
///
/// GET /api/orders/{id}
#[instrument(skip_all, fields(user_id = %user.id, order_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<ApiResponse<OrderDetail>> {
    OrderRepository::new(state.pool())
        .get_detail(id)
        .await?
        .filter(|detail| detail.order.user_id == user.id)
        .map(ApiResponse::new)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

/// Cancel one of the signed-in user's orders before it ships.
///
/// POST /api/orders/{id}/cancel
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<ApiResponse<Order>> {
    let order = CheckoutService::from_state(&state)
        .cancel(id, Some(user.id), user.id)
        .await?;
    Ok(ApiResponse::new(order))
}
