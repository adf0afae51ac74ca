//! Warehouse management.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use marketstall_core::WarehouseId;

use crate::db::{InventoryRepository, WarehouseRepository};
use crate::error::{ApiResponse, AppError, Created, Result};
use crate::middleware::RequireAdmin;
use crate::models::inventory::{NewWarehouse, StockLevel, Warehouse, WarehouseUpdate};
use crate::state::AppState;

/// Longest accepted warehouse code.
const MAX_CODE_LENGTH: usize = 32;

/// A warehouse with what it holds.
#[derive(Debug, serde::Serialize)]
pub struct WarehouseWithStock {
    #[serde(flatten)]
    pub warehouse: Warehouse,
    pub stock_levels: Vec<StockLevel>,
}

/// All warehouses in shipping priority order.
///
/// GET /api/admin/warehouses
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<Vec<Warehouse>>> {
    let warehouses = WarehouseRepository::new(state.pool()).list().await?;
    Ok(ApiResponse::new(warehouses))
}

/// GET /api/admin/warehouses/{id}
#[instrument(skip_all, fields(warehouse_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<WarehouseId>,
) -> Result<ApiResponse<WarehouseWithStock>> {
    let warehouse = WarehouseRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Warehouse not found".to_string()))?;
    let stock_levels = InventoryRepository::new(state.pool())
        .stock_by_warehouse(id)
        .await?;

    Ok(ApiResponse::new(WarehouseWithStock {
        warehouse,
        stock_levels,
    }))
}

/// POST /api/admin/warehouses
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, code = %body.code))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(mut body): Json<NewWarehouse>,
) -> Result<Created<Warehouse>> {
    body.code = normalize_code(&body.code)?;
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }

    let warehouse = WarehouseRepository::new(state.pool()).create(&body).await?;
    tracing::info!(warehouse_id = %warehouse.id, code = %warehouse.code, "Warehouse created");

    Ok(Created(warehouse))
}

/// PUT /api/admin/warehouses/{id}
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<WarehouseId>,
    Json(body): Json<WarehouseUpdate>,
) -> Result<ApiResponse<Warehouse>> {
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("Name must not be empty".to_string()));
    }

    let warehouse = WarehouseRepository::new(state.pool())
        .update(id, &body)
        .await?;
    Ok(ApiResponse::new(warehouse))
}

/// Stop shipping from a warehouse. Its stock rows are kept.
///
/// DELETE /api/admin/warehouses/{id}
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn deactivate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<WarehouseId>,
) -> Result<ApiResponse<Warehouse>> {
    let warehouse = WarehouseRepository::new(state.pool()).deactivate(id).await?;
    state.products().invalidate_all();
    tracing::info!(warehouse_id = %id, "Warehouse deactivated");

    Ok(ApiResponse::new(warehouse))
}

/// Codes are upper-case ASCII letters, digits, dashes and underscores.
fn normalize_code(code: &str) -> Result<String> {
    let code = code.trim().to_ascii_uppercase();
    let valid = !code.is_empty()
        && code.len() <= MAX_CODE_LENGTH
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(code)
    } else {
        Err(AppError::BadRequest(format!(
            "Warehouse code must be 1-{MAX_CODE_LENGTH} letters, digits, '-' or '_'"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" eu-1 ").unwrap(), "EU-1");
        assert!(normalize_code("").is_err());
        assert!(normalize_code("main warehouse").is_err());
        assert!(normalize_code(&"X".repeat(MAX_CODE_LENGTH + 1)).is_err());
    }
}
