//! Database operations for the storefront `PostgreSQL` database.
//!
//! # Schema: `shop`
//!
//! ## Tables
//!
//! - `user`, `user_password`, `api_token`, `password_reset_token` - Accounts
//! - `product`, `review`, `wishlist_item` - Catalog
//! - `cart`, `cart_item` - User and guest carts
//! - `order`, `order_item`, `order_item_allocation` - Orders and the stock
//!   each line took from each warehouse
//! - `warehouse`, `stock_level`, `inventory_movement` - Inventory
//! - `tower_sessions.session` - Session storage (created by the session store)
//!
//! # Migrations
//!
//! Migrations are stored in the workspace `migrations/` directory and run via:
//! ```bash
//! cargo run -p marketstall-cli -- migrate
//! ```

pub mod carts;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod tokens;
pub mod users;
pub mod warehouses;
pub mod wishlists;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use marketstall_core::ProductId;

pub use carts::CartRepository;
pub use inventory::InventoryRepository;
pub use orders::{NewOrder, OrderRepository, OrderUpdateError, PaymentSettlement, StatusChange};
pub use products::ProductRepository;
pub use reviews::ReviewRepository;
pub use tokens::TokenRepository;
pub use users::UserRepository;
pub use warehouses::WarehouseRepository;
pub use wishlists::WishlistRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A stock change would leave a negative quantity.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i64,
    },
}

impl RepositoryError {
    /// Map a unique violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_unique(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Largest page size a listing accepts.
const MAX_PAGE_SIZE: i64 = 100;

/// Clamp a 1-based page number and page size to `(limit, offset)`.
pub(crate) fn page_bounds(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> (i64, i64) {
    let limit = limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
    let page = page.unwrap_or(1).clamp(1, i64::MAX / MAX_PAGE_SIZE);
    (limit, (page - 1).saturating_mul(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds_defaults() {
        assert_eq!(page_bounds(None, None, 20), (20, 0));
        assert_eq!(page_bounds(Some(3), Some(10), 20), (10, 20));
    }

    #[test]
    fn test_page_bounds_clamps() {
        assert_eq!(page_bounds(Some(0), Some(500), 20), (100, 0));
        assert_eq!(page_bounds(Some(-4), Some(0), 20), (1, 0));
    }

    #[test]
    fn test_page_bounds_huge_page_does_not_overflow() {
        let (limit, offset) = page_bounds(Some(i64::MAX), Some(20), 20);
        assert_eq!(limit, 20);
        assert!(offset > 0);

        let (_, offset) = page_bounds(Some(i64::MAX), Some(100), 20);
        assert!(offset > 0);
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = RepositoryError::InsufficientStock {
            product_id: ProductId::new(7),
            requested: 5,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for product 7: requested 5, available 2"
        );
    }
}
