//! Cached catalog lookups.
//!
//! Product detail pages are read far more often than products change, so
//! lookups by slug go through a short-lived `moka` cache. Admin writes
//! invalidate the affected entries.

use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tracing::debug;

use crate::db::{ProductRepository, RepositoryError};
use crate::models::product::Product;

const CACHE_TTL: Duration = Duration::from_secs(60);
const CACHE_CAPACITY: u64 = 2_000;

/// Cache of active products keyed by slug.
#[derive(Clone)]
pub struct ProductCache {
    cache: Cache<String, Product>,
}

impl Default for ProductCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    /// Get an active product by slug, reading through the cache.
    ///
    /// Misses are not cached, so a newly created product shows up at once.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the lookup fails.
    pub async fn get_by_slug(
        &self,
        pool: &PgPool,
        slug: &str,
    ) -> Result<Option<Product>, RepositoryError> {
        if let Some(product) = self.cache.get(slug).await {
            debug!(slug = %slug, "Product cache hit");
            return Ok(Some(product));
        }

        let product = ProductRepository::new(pool).get_active_by_slug(slug).await?;
        if let Some(product) = &product {
            self.cache.insert(slug.to_string(), product.clone()).await;
        }
        Ok(product)
    }

    /// Drop a cached product.
    pub async fn invalidate(&self, slug: &str) {
        self.cache.invalidate(slug).await;
    }

    /// Drop every cached product.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl std::fmt::Debug for ProductCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
