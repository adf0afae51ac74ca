//! Inventory management route handlers.
//!
//! Every stock change goes through the inventory repository, which writes
//! the stock row and its movement in one transaction.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::instrument;

use marketstall_core::{ProductId, WarehouseId};

use crate::db::{InventoryRepository, ProductRepository};
use crate::error::{ApiResponse, AppError, Created, Result};
use crate::middleware::RequireAdmin;
use crate::models::Page;
use crate::models::inventory::{
    AdjustStock, Movement, MovementFilter, SetStock, StockLevel, TransferResult, TransferStock,
};
use crate::state::AppState;

/// Longest accepted movement note.
const MAX_NOTE_LENGTH: usize = 500;

/// Stock of one product in every warehouse.
///
/// GET /api/admin/inventory/products/{id}
#[instrument(skip_all, fields(product_id = %id))]
pub async fn product_stock(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<ApiResponse<Vec<StockLevel>>> {
    let levels = InventoryRepository::new(state.pool())
        .stock_by_product(id)
        .await?;
    Ok(ApiResponse::new(levels))
}

/// Stock held in one warehouse.
///
/// GET /api/admin/inventory/warehouses/{id}
#[instrument(skip_all, fields(warehouse_id = %id))]
pub async fn warehouse_stock(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<WarehouseId>,
) -> Result<ApiResponse<Vec<StockLevel>>> {
    let levels = InventoryRepository::new(state.pool())
        .stock_by_warehouse(id)
        .await?;
    Ok(ApiResponse::new(levels))
}

/// Stock rows at or under their threshold in active warehouses.
///
/// GET /api/admin/inventory/low-stock
#[instrument(skip_all)]
pub async fn low_stock(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<Vec<StockLevel>>> {
    let levels = InventoryRepository::new(state.pool()).low_stock().await?;
    Ok(ApiResponse::new(levels))
}

/// Movement history, newest first.
///
/// GET /api/admin/inventory/movements
#[instrument(skip(state, _admin))]
pub async fn movements(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(filter): Query<MovementFilter>,
) -> Result<ApiResponse<Page<Movement>>> {
    let page = InventoryRepository::new(state.pool())
        .movements(&filter)
        .await?;
    Ok(ApiResponse::new(page))
}

/// Add or remove stock in one warehouse.
///
/// POST /api/admin/inventory/adjust
#[instrument(
    skip(state, admin, body),
    fields(admin_id = %admin.id, product_id = %body.product_id, delta = body.delta)
)]
pub async fn adjust(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<AdjustStock>,
) -> Result<Created<Movement>> {
    if body.delta == 0 {
        return Err(AppError::BadRequest("Delta must not be zero".to_string()));
    }
    let note = checked_note(body.note.as_deref())?;

    let movement = InventoryRepository::new(state.pool())
        .adjust(
            body.product_id,
            body.warehouse_id,
            body.delta,
            note,
            Some(admin.id),
        )
        .await?;

    refresh_product(&state, body.product_id).await;
    tracing::info!(
        movement_id = %movement.id,
        quantity_after = movement.quantity_after,
        "Stock adjusted"
    );

    Ok(Created(movement))
}

/// Set the counted quantity in one warehouse.
///
/// Answers with the movement, or `null` when the quantity was already right.
///
/// PUT /api/admin/inventory/set
#[instrument(
    skip(state, admin, body),
    fields(admin_id = %admin.id, product_id = %body.product_id, quantity = body.quantity)
)]
pub async fn set(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<SetStock>,
) -> Result<ApiResponse<Option<Movement>>> {
    if body.quantity < 0 {
        return Err(AppError::BadRequest(
            "Quantity must not be negative".to_string(),
        ));
    }
    if body.low_stock_threshold.is_some_and(|t| t < 0) {
        return Err(AppError::BadRequest(
            "Low stock threshold must not be negative".to_string(),
        ));
    }
    let note = checked_note(body.note.as_deref())?;

    let movement = InventoryRepository::new(state.pool())
        .set(
            body.product_id,
            body.warehouse_id,
            body.quantity,
            body.low_stock_threshold,
            note,
            Some(admin.id),
        )
        .await?;

    refresh_product(&state, body.product_id).await;
    Ok(ApiResponse::new(movement))
}

/// Move stock between two active warehouses.
///
/// POST /api/admin/inventory/transfer
#[instrument(
    skip(state, admin, body),
    fields(admin_id = %admin.id, product_id = %body.product_id, quantity = body.quantity)
)]
pub async fn transfer(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<TransferStock>,
) -> Result<Created<TransferResult>> {
    if body.quantity <= 0 {
        return Err(AppError::BadRequest(
            "Quantity must be positive".to_string(),
        ));
    }
    if body.from_warehouse_id == body.to_warehouse_id {
        return Err(AppError::BadRequest(
            "Source and destination warehouse must differ".to_string(),
        ));
    }
    let note = checked_note(body.note.as_deref())?;

    let result = InventoryRepository::new(state.pool())
        .transfer(
            body.product_id,
            body.from_warehouse_id,
            body.to_warehouse_id,
            body.quantity,
            note,
            Some(admin.id),
        )
        .await?;

    refresh_product(&state, body.product_id).await;
    tracing::info!(reference = %result.reference, "Stock transferred");

    Ok(Created(result))
}

/// Drop the cached product so its stock total is re-read.
async fn refresh_product(state: &AppState, id: ProductId) {
    match ProductRepository::new(state.pool()).get_by_id(id).await {
        Ok(Some(product)) => state.products().invalidate(&product.slug).await,
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(product_id = %id, error = %err, "Cache refresh lookup failed");
            state.products().invalidate_all();
        }
    }
}

fn checked_note(note: Option<&str>) -> Result<Option<&str>> {
    let note = note.map(str::trim).filter(|n| !n.is_empty());
    if note.is_some_and(|n| n.chars().count() > MAX_NOTE_LENGTH) {
        return Err(AppError::BadRequest(format!(
            "Note must be at most {MAX_NOTE_LENGTH} characters"
        )));
    }
    Ok(note)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_note() {
        assert_eq!(checked_note(Some("  recount ")).unwrap(), Some("recount"));
        assert_eq!(checked_note(Some("   ")).unwrap(), None);
        assert_eq!(checked_note(None).unwrap(), None);
        assert!(checked_note(Some(&"n".repeat(MAX_NOTE_LENGTH + 1))).is_err());
    }
}
