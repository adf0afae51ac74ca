//! Dashboard statistics.

use axum::extract::State;
use tracing::instrument;

use crate::db::{InventoryRepository, OrderRepository, ProductRepository, UserRepository};
use crate::error::{ApiResponse, Result};
use crate::middleware::RequireAdmin;
use crate::models::order::DashboardStats;
use crate::state::AppState;

/// GET /api/admin/dashboard
#[instrument(skip(state, _admin))]
pub async fn stats(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<DashboardStats>> {
    let pool = state.pool();
    let order_repo = OrderRepository::new(pool);
    let product_repo = ProductRepository::new(pool);
    let user_repo = UserRepository::new(pool);
    let inventory_repo = InventoryRepository::new(pool);

    let (orders, total_products, total_customers, low_stock_count) = tokio::try_join!(
        order_repo.totals(),
        product_repo.count_active(),
        user_repo.count_customers(),
        inventory_repo.count_low_stock(),
    )?;
    let (total_orders, pending_orders, paid_revenue) = orders;

    Ok(ApiResponse::new(DashboardStats {
        total_orders,
        pending_orders,
        paid_revenue,
        total_products,
        total_customers,
        low_stock_count,
    }))
}
