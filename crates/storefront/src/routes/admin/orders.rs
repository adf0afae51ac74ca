//! Order management.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use tracing::instrument;

use marketstall_core::OrderId;

use crate::db::{InventoryRepository, OrderRepository};
use crate::error::{ApiResponse, AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::Page;
use crate::models::inventory::Movement;
use crate::models::order::{Order, OrderDetail, OrderFilter, StatusUpdate};
use crate::services::CheckoutService;
use crate::state::AppState;

/// An order with the stock movements it caused.
#[derive(Debug, Serialize)]
pub struct AdminOrderDetail {
    #[serde(flatten)]
    pub order: OrderDetail,
    pub stock_movements: Vec<Movement>,
}

/// Every order, newest first, optionally by status.
///
/// GET /api/admin/orders
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(filter): Query<OrderFilter>,
) -> Result<ApiResponse<Page<Order>>> {
    let page = OrderRepository::new(state.pool()).list(&filter).await?;
    Ok(ApiResponse::new(page))
}

/// GET /api/admin/orders/{id}
#[instrument(skip_all, fields(order_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<OrderId>,
) -> Result<ApiResponse<AdminOrderDetail>> {
    let order = OrderRepository::new(state.pool())
        .get_detail(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    let stock_movements = InventoryRepository::new(state.pool())
        .movements_for_order(id)
        .await?;

    Ok(ApiResponse::new(AdminOrderDetail {
        order,
        stock_movements,
    }))
}

/// Move an order along its lifecycle.
///
/// PUT /api/admin/orders/{id}/status
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, status = %body.status))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusUpdate>,
) -> Result<ApiResponse<Order>> {
    let order = CheckoutService::from_state(&state)
        .update_status(
            id,
            body.status,
            body.tracking_number.as_deref(),
            None,
            admin.id,
        )
        .await?;

    tracing::info!(order_id = %order.id, status = %order.status, "Order status updated");
    Ok(ApiResponse::new(order))
}
