//! Admin API under `/api/admin`.
//!
//! Every handler takes [`RequireAdmin`](crate::middleware::RequireAdmin), so
//! the role is checked against the database on each request.

pub mod dashboard;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod users;
pub mod warehouses;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Create the admin routes router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard::stats))
        // Catalog
        .route("/products", get(products::index).post(products::create))
        .route(
            "/products/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
        // Orders
        .route("/orders", get(orders::index))
        .route("/orders/{id}", get(orders::show))
        .route("/orders/{id}/status", put(orders::update_status))
        // Users
        .route("/users", get(users::index))
        .route("/users/{id}/role", put(users::update_role))
        // Warehouses
        .route(
            "/warehouses",
            get(warehouses::index).post(warehouses::create),
        )
        .route(
            "/warehouses/{id}",
            get(warehouses::show)
                .put(warehouses::update)
                .delete(warehouses::deactivate),
        )
        // Inventory
        .route("/inventory/products/{id}", get(inventory::product_stock))
        .route(
            "/inventory/warehouses/{id}",
            get(inventory::warehouse_stock),
        )
        .route("/inventory/low-stock", get(inventory::low_stock))
        .route("/inventory/movements", get(inventory::movements))
        .route("/inventory/adjust", post(inventory::adjust))
        .route("/inventory/set", put(inventory::set))
        .route("/inventory/transfer", post(inventory::transfer))
}
