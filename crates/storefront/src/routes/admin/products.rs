//! Catalog management.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use rust_decimal::Decimal;
use tracing::instrument;

use marketstall_core::{ProductId, slugify};

use crate::db::{InventoryRepository, ProductRepository};
use crate::error::{ApiResponse, AppError, Created, Result};
use crate::middleware::RequireAdmin;
use crate::models::Page;
use crate::models::inventory::StockLevel;
use crate::models::product::{NewProduct, Product, ProductFilter, ProductUpdate};
use crate::state::AppState;

/// A product with its stock per warehouse.
#[derive(Debug, serde::Serialize)]
pub struct ProductWithStock {
    #[serde(flatten)]
    pub product: Product,
    pub stock_levels: Vec<StockLevel>,
}

/// All products, including inactive ones.
///
/// GET /api/admin/products
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(mut filter): Query<ProductFilter>,
) -> Result<ApiResponse<Page<Product>>> {
    filter.include_inactive = true;
    let page = ProductRepository::new(state.pool()).list(&filter).await?;
    Ok(ApiResponse::new(page))
}

/// GET /api/admin/products/{id}
#[instrument(skip_all, fields(product_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<ApiResponse<ProductWithStock>> {
    let product = ProductRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
    let stock_levels = InventoryRepository::new(state.pool())
        .stock_by_product(id)
        .await?;

    Ok(ApiResponse::new(ProductWithStock {
        product,
        stock_levels,
    }))
}

/// Create a product. The slug is derived from the name when not given.
///
/// POST /api/admin/products
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, name = %body.name))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<NewProduct>,
) -> Result<Created<Product>> {
    validate_new(&body)?;

    let slug = match body.slug.as_deref().map(str::trim) {
        Some(given) if !given.is_empty() => checked_slug(given)?,
        _ => slugify(&body.name),
    };
    if slug.is_empty() {
        return Err(AppError::BadRequest(
            "Name must contain letters or digits".to_string(),
        ));
    }

    let products = ProductRepository::new(state.pool());
    if products.slug_exists(&slug).await? {
        return Err(AppError::Conflict(format!(
            "A product with slug '{slug}' already exists"
        )));
    }

    let product = products.create(&body, &slug).await?;
    state.products().invalidate(&product.slug).await;
    tracing::info!(product_id = %product.id, slug = %product.slug, "Product created");

    Ok(Created(product))
}

/// Partially update a product.
///
/// PUT /api/admin/products/{id}
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(mut body): Json<ProductUpdate>,
) -> Result<ApiResponse<Product>> {
    validate_update(&body)?;
    if let Some(slug) = body.slug.as_deref() {
        body.slug = Some(checked_slug(slug)?);
    }

    let products = ProductRepository::new(state.pool());
    let before = products
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let product = products.update(id, &body).await?;

    state.products().invalidate(&before.slug).await;
    if product.slug != before.slug {
        state.products().invalidate(&product.slug).await;
    }
    tracing::info!(product_id = %id, "Product updated");

    Ok(ApiResponse::new(product))
}

/// Hide a product from the catalog. Orders keep referring to it.
///
/// DELETE /api/admin/products/{id}
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<ApiResponse<serde_json::Value>> {
    let slug = ProductRepository::new(state.pool()).deactivate(id).await?;
    state.products().invalidate(&slug).await;
    tracing::info!(product_id = %id, "Product deactivated");

    Ok(ApiResponse::new(serde_json::json!({ "id": id, "active": false })))
}

/// A caller-supplied slug must already be in canonical form.
fn checked_slug(slug: &str) -> Result<String> {
    let canonical = slugify(slug);
    if canonical.is_empty() || canonical != slug {
        return Err(AppError::BadRequest(format!(
            "Invalid slug '{slug}', try '{canonical}'"
        )));
    }
    Ok(canonical)
}

fn check_price(price: Decimal, compare_at: Option<Decimal>) -> Result<()> {
    if price.is_sign_negative() {
        return Err(AppError::BadRequest("Price must not be negative".to_string()));
    }
    if compare_at.is_some_and(|c| c.is_sign_negative()) {
        return Err(AppError::BadRequest(
            "Compare-at price must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_new(body: &NewProduct) -> Result<()> {
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }
    if body.category.trim().is_empty() {
        return Err(AppError::BadRequest("Category is required".to_string()));
    }
    check_price(body.price, body.compare_at_price)
}

fn validate_update(body: &ProductUpdate) -> Result<()> {
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("Name must not be empty".to_string()));
    }
    if body.category.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(AppError::BadRequest("Category must not be empty".to_string()));
    }
    check_price(body.price.unwrap_or_default(), body.compare_at_price)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_product(name: &str, price: &str) -> NewProduct {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "price": price,
            "category": "shirts",
        }))
        .unwrap()
    }

    #[test]
    fn test_checked_slug() {
        assert_eq!(checked_slug("linen-shirt").unwrap(), "linen-shirt");
        assert!(checked_slug("Linen Shirt").is_err());
        assert!(checked_slug("--").is_err());
    }

    #[test]
    fn test_validate_new() {
        assert!(validate_new(&new_product("Linen Shirt", "49.00")).is_ok());
        assert!(validate_new(&new_product("  ", "49.00")).is_err());
        assert!(validate_new(&new_product("Linen Shirt", "-1")).is_err());
    }

    #[test]
    fn test_validate_update_allows_partial() {
        assert!(validate_update(&ProductUpdate::default()).is_ok());
        let blank = ProductUpdate {
            name: Some(String::new()),
            ..ProductUpdate::default()
        };
        assert!(validate_update(&blank).is_err());
    }
}
