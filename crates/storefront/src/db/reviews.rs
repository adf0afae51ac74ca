//! Review repository.
//!
//! Product `rating_avg` and `review_count` are recomputed in the same
//! transaction as each review insert or delete.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use marketstall_core::{ProductId, ReviewId, UserId};

use super::{RepositoryError, page_bounds};
use crate::models::review::{NewReview, Review};
use crate::models::{Page, Pagination};

const REVIEW_SELECT: &str = r"
    SELECT r.id, r.product_id, r.user_id, u.name AS author_name, r.rating, r.title,
           r.body, r.verified_purchase, r.created_at
    FROM shop.review r
    JOIN shop.user u ON u.id = r.user_id
";

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    product_id: i32,
    user_id: i32,
    author_name: String,
    rating: i16,
    title: String,
    body: String,
    verified_purchase: bool,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: ReviewId::new(row.id),
            product_id: ProductId::new(row.product_id),
            user_id: UserId::new(row.user_id),
            author_name: row.author_name,
            rating: row.rating,
            title: row.title,
            body: row.body,
            verified_purchase: row.verified_purchase,
            created_at: row.created_at,
        }
    }
}

async fn refresh_product_rating(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> Result<(), RepositoryError> {
    // Serialize concurrent review writes for the product before aggregating.
    sqlx::query("SELECT id FROM shop.product WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r"
        UPDATE shop.product p SET
            rating_avg = COALESCE(agg.avg, 0),
            review_count = agg.count
        FROM (
            SELECT ROUND(AVG(rating)::NUMERIC, 2) AS avg, COUNT(*)::INTEGER AS count
            FROM shop.review
            WHERE product_id = $1
        ) agg
        WHERE p.id = $1
        ",
    )
    .bind(product_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Repository for product reviews.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Reviews of a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<Review>, RepositoryError> {
        let (limit, offset) = page_bounds(page, limit, 20);

        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM shop.review WHERE product_id = $1")
                .bind(product_id)
                .fetch_one(self.pool)
                .await?;

        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "{REVIEW_SELECT} WHERE r.product_id = $1 ORDER BY r.created_at DESC, r.id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(product_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(Review::from).collect(),
            pagination: Pagination::new(limit, offset, total),
        })
    }

    /// Get a review by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!("{REVIEW_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Review::from))
    }

    /// Create a review and refresh the product's rating.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the user already reviewed the product.
    pub async fn create(
        &self,
        product_id: ProductId,
        user_id: UserId,
        input: &NewReview,
        verified_purchase: bool,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, ReviewId>(
            r"
            INSERT INTO shop.review (product_id, user_id, rating, title, body, verified_purchase)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(product_id)
        .bind(user_id)
        .bind(input.rating)
        .bind(input.title.trim())
        .bind(input.body.trim())
        .bind(verified_purchase)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            RepositoryError::from_unique(e, "You have already reviewed this product")
        })?;

        refresh_product_rating(&mut tx, product_id).await?;

        let row = sqlx::query_as::<_, ReviewRow>(&format!("{REVIEW_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Review::from(row))
    }

    /// Delete a review and refresh the product's rating.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review doesn't exist.
    pub async fn delete(&self, id: ReviewId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let product_id = sqlx::query_scalar::<_, ProductId>(
            "DELETE FROM shop.review WHERE id = $1 RETURNING product_id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        refresh_product_rating(&mut tx, product_id).await?;

        tx.commit().await?;

        Ok(())
    }
}
