//! Domain models for the storefront.
//!
//! These are the types handlers return and repositories produce; database row
//! types stay private to the `db` module.

pub mod cart;
pub mod inventory;
pub mod order;
pub mod product;
pub mod review;
pub mod session;
pub mod user;

use serde::{Deserialize, Serialize};

pub use session::{CurrentUser, keys as session_keys};
pub use user::User;

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Position of a page within a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    #[must_use]
    pub const fn new(limit: i64, offset: i64, total: i64) -> Self {
        let limit = if limit < 1 { 1 } else { limit };
        Self {
            page: offset / limit + 1,
            limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}

/// `?page=&limit=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_counts_pages() {
        let p = Pagination::new(20, 40, 41);
        assert_eq!(p.page, 3);
        assert_eq!(p.pages, 3);

        let empty = Pagination::new(20, 0, 0);
        assert_eq!(empty.page, 1);
        assert_eq!(empty.pages, 0);
    }
}
