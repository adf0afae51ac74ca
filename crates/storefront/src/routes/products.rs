//! Catalog route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::instrument;

use marketstall_core::ReviewId;

use crate::db::{OrderRepository, ProductRepository, RepositoryError, ReviewRepository};
use crate::error::{ApiResponse, AppError, Created, Result};
use crate::middleware::RequireAuth;
use crate::models::product::{CategoryCount, Product, ProductFilter};
use crate::models::review::{NewReview, Review};
use crate::models::{Page, PageQuery};
use crate::state::AppState;

/// Maximum review title length.
const MAX_TITLE_LENGTH: usize = 200;

/// Maximum review body length.
const MAX_BODY_LENGTH: usize = 5_000;

/// List active products.
///
/// GET /api/products
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(mut filter): Query<ProductFilter>,
) -> Result<ApiResponse<Page<Product>>> {
    filter.include_inactive = false;
    if let (Some(min), Some(max)) = (filter.min_price, filter.max_price)
        && min > max
    {
        return Err(AppError::BadRequest(
            "min_price must not exceed max_price".to_string(),
        ));
    }

    let page = ProductRepository::new(state.pool()).list(&filter).await?;
    Ok(ApiResponse::new(page))
}

/// Product detail.
///
/// GET /api/products/{slug}
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<ApiResponse<Product>> {
    state
        .products()
        .get_by_slug(state.pool(), &slug)
        .await?
        .map(ApiResponse::new)
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}

/// Categories with product counts.
///
/// GET /api/categories
#[instrument(skip_all)]
pub async fn categories(State(state): State<AppState>) -> Result<ApiResponse<Vec<CategoryCount>>> {
    let categories = ProductRepository::new(state.pool()).categories().await?;
    Ok(ApiResponse::new(categories))
}

/// Reviews of a product.
///
/// GET /api/products/{slug}/reviews
#[instrument(skip(state))]
pub async fn reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<Page<Review>>> {
    let product = active_product(&state, &slug).await?;
    let page = ReviewRepository::new(state.pool())
        .list_for_product(product.id, query.page, query.limit)
        .await?;
    Ok(ApiResponse::new(page))
}

/// Review a product. One review per user and product.
///
/// POST /api/products/{slug}/reviews
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create_review(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<NewReview>,
) -> Result<Created<Review>> {
    validate_review(&body)?;

    let product = active_product(&state, &slug).await?;
    let verified = OrderRepository::new(state.pool())
        .has_delivered_purchase(user.id, product.id)
        .await?;

    let review = ReviewRepository::new(state.pool())
        .create(product.id, user.id, &body, verified)
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(msg) => AppError::BadRequest(msg),
            other => AppError::Database(other),
        })?;

    state.products().invalidate(&product.slug).await;
    tracing::info!(review_id = %review.id, product_id = %product.id, "Review created");

    Ok(Created(review))
}

/// Delete a review. Allowed for its author and for admins.
///
/// DELETE /api/reviews/{id}
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<serde_json::Value>> {
    let reviews = ReviewRepository::new(state.pool());
    let review = reviews
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    if review.user_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "You can only delete your own reviews".to_string(),
        ));
    }

    reviews.delete(id).await?;

    if let Some(product) = ProductRepository::new(state.pool())
        .get_by_id(review.product_id)
        .await?
    {
        state.products().invalidate(&product.slug).await;
    }

    Ok(ApiResponse::new(serde_json::json!({ "deleted": id })))
}

async fn active_product(state: &AppState, slug: &str) -> Result<Product> {
    state
        .products()
        .get_by_slug(state.pool(), slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}

fn validate_review(review: &NewReview) -> Result<()> {
    if !review.has_valid_rating() {
        return Err(AppError::BadRequest(
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    if review.title.chars().count() > MAX_TITLE_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Title must be at most {MAX_TITLE_LENGTH} characters"
        )));
    }
    if review.body.chars().count() > MAX_BODY_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Review must be at most {MAX_BODY_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: i16, body: &str) -> NewReview {
        NewReview {
            rating,
            title: "Great".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_validate_review_rating() {
        assert!(validate_review(&review(5, "ok")).is_ok());
        assert!(matches!(
            validate_review(&review(0, "ok")),
            Err(AppError::BadRequest(_))
        ));
        assert!(validate_review(&review(6, "ok")).is_err());
    }

    #[test]
    fn test_validate_review_length() {
        let long = "x".repeat(MAX_BODY_LENGTH + 1);
        assert!(validate_review(&review(4, &long)).is_err());
    }
}
