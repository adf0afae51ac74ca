//! Product repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use marketstall_core::ProductId;

use super::{RepositoryError, page_bounds};
use crate::models::product::{CategoryCount, NewProduct, Product, ProductFilter, ProductUpdate};
use crate::models::{Page, Pagination};

/// Product columns plus total stock in active warehouses.
const PRODUCT_SELECT: &str = r"
    SELECT p.id, p.name, p.slug, p.description, p.price, p.compare_at_price,
           p.category, p.brand, p.sizes, p.colors, p.images, p.is_active,
           p.is_featured, p.rating_avg, p.review_count, p.created_at, p.updated_at,
           COALESCE((
               SELECT SUM(s.quantity)
               FROM shop.stock_level s
               JOIN shop.warehouse w ON w.id = s.warehouse_id
               WHERE s.product_id = p.id AND w.is_active
           ), 0)::BIGINT AS stock
    FROM shop.product p
";

/// Filter shared by the listing and its count; `$1..$7` are the filter values.
const PRODUCT_FILTER: &str = r"
    WHERE ($1 OR p.is_active)
      AND ($2::TEXT IS NULL OR p.name ILIKE $2 OR p.description ILIKE $2)
      AND ($3::TEXT IS NULL OR p.category = $3)
      AND ($4::TEXT IS NULL OR p.brand = $4)
      AND ($5::NUMERIC IS NULL OR p.price >= $5)
      AND ($6::NUMERIC IS NULL OR p.price <= $6)
      AND ($7::BOOLEAN IS NULL OR p.is_featured = $7)
";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    slug: String,
    description: String,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    category: String,
    brand: Option<String>,
    sizes: Vec<String>,
    colors: Vec<String>,
    images: Vec<String>,
    is_active: bool,
    is_featured: bool,
    rating_avg: Decimal,
    review_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    stock: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            name: row.name,
            slug: row.slug,
            description: row.description,
            price: row.price,
            compare_at_price: row.compare_at_price,
            category: row.category,
            brand: row.brand,
            sizes: row.sizes,
            colors: row.colors,
            images: row.images,
            is_active: row.is_active,
            is_featured: row.is_featured,
            rating_avg: row.rating_avg,
            review_count: row.review_count,
            stock: row.stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Escape `LIKE` wildcards and wrap the term for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Repository for catalog queries and admin product writes.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products matching a filter.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &ProductFilter) -> Result<Page<Product>, RepositoryError> {
        let (limit, offset) = page_bounds(filter.page, filter.limit, 20);
        let search = non_blank(filter.search.as_ref()).map(like_pattern);
        let category = non_blank(filter.category.as_ref());
        let brand = non_blank(filter.brand.as_ref());

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM shop.product p {PRODUCT_FILTER}"
        ))
        .bind(filter.include_inactive)
        .bind(search.as_deref())
        .bind(category)
        .bind(brand)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.featured)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{PRODUCT_SELECT} {PRODUCT_FILTER} ORDER BY {} LIMIT $8 OFFSET $9",
            filter.sort.order_by()
        ))
        .bind(filter.include_inactive)
        .bind(search.as_deref())
        .bind(category)
        .bind(brand)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.featured)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(Product::from).collect(),
            pagination: Pagination::new(limit, offset, total),
        })
    }

    /// Get an active product by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "{PRODUCT_SELECT} WHERE p.slug = $1 AND p.is_active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    /// Get a product by slug, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{PRODUCT_SELECT} WHERE p.slug = $1"))
            .bind(slug)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Product::from))
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{PRODUCT_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Product::from))
    }

    /// Get active products by ID, in the order the IDs are given.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many_active(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{PRODUCT_SELECT} WHERE p.id = ANY($1) AND p.is_active"
        ))
        .bind(&raw)
        .fetch_all(self.pool)
        .await?;

        let mut products: Vec<Product> = rows.into_iter().map(Product::from).collect();
        products.sort_by_key(|p| ids.iter().position(|id| *id == p.id));
        Ok(products)
    }

    /// Distinct categories of active products with counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<CategoryCount>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryCount>(
            r"
            SELECT category, COUNT(*) AS product_count
            FROM shop.product
            WHERE is_active
            GROUP BY category
            ORDER BY category
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, input: &NewProduct, slug: &str) -> Result<Product, RepositoryError> {
        let id = sqlx::query_scalar::<_, ProductId>(
            r"
            INSERT INTO shop.product (
                name, slug, description, price, compare_at_price, category, brand,
                sizes, colors, images, is_featured
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            ",
        )
        .bind(input.name.trim())
        .bind(slug)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.compare_at_price)
        .bind(input.category.trim())
        .bind(input.brand.as_deref())
        .bind(&input.sizes)
        .bind(&input.colors)
        .bind(&input.images)
        .bind(input.is_featured)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "slug already exists"))?;

        self.get_by_id(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new slug is taken.
    pub async fn update(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let updated = sqlx::query_scalar::<_, ProductId>(
            r"
            UPDATE shop.product SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                price = COALESCE($5, price),
                compare_at_price = COALESCE($6, compare_at_price),
                category = COALESCE($7, category),
                brand = COALESCE($8, brand),
                sizes = COALESCE($9, sizes),
                colors = COALESCE($10, colors),
                images = COALESCE($11, images),
                is_active = COALESCE($12, is_active),
                is_featured = COALESCE($13, is_featured)
            WHERE id = $1
            RETURNING id
            ",
        )
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.slug.as_deref())
        .bind(update.description.as_deref())
        .bind(update.price)
        .bind(update.compare_at_price)
        .bind(update.category.as_deref())
        .bind(update.brand.as_deref())
        .bind(update.sizes.as_deref())
        .bind(update.colors.as_deref())
        .bind(update.images.as_deref())
        .bind(update.is_active)
        .bind(update.is_featured)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "slug already exists"))?
        .ok_or(RepositoryError::NotFound)?;

        self.get_by_id(updated).await?.ok_or(RepositoryError::NotFound)
    }

    /// Hide a product from the catalog. Returns its slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn deactivate(&self, id: ProductId) -> Result<String, RepositoryError> {
        sqlx::query_scalar::<_, String>(
            "UPDATE shop.product SET is_active = FALSE WHERE id = $1 RETURNING slug",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Whether a slug is already used by another product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn slug_exists(&self, slug: &str) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM shop.product WHERE slug = $1)",
        )
        .bind(slug)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Count active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_active(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM shop.product WHERE is_active")
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("tee"), "%tee%");
        assert_eq!(like_pattern("100%_cotton"), "%100\\%\\_cotton%");
    }

    #[test]
    fn test_non_blank() {
        let blank = "   ".to_string();
        let value = " Shirts ".to_string();
        assert_eq!(non_blank(Some(&blank)), None);
        assert_eq!(non_blank(Some(&value)), Some("Shirts"));
        assert_eq!(non_blank(None), None);
    }
}
