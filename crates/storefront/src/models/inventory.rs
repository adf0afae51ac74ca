//! Warehouse and stock types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marketstall_core::{MovementId, MovementKind, ProductId, UserId, WarehouseId};

/// A stocking location.
#[derive(Debug, Clone, Serialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub code: String,
    pub name: String,
    pub location: Option<String>,
    /// Lower ships first.
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/admin/warehouses`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWarehouse {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

const fn default_priority() -> i32 {
    100
}

/// Body of `PUT /api/admin/warehouses/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarehouseUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

/// On-hand quantity of a product in a warehouse.
#[derive(Debug, Clone, Serialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub product_name: String,
    pub warehouse_id: WarehouseId,
    pub warehouse_code: String,
    pub quantity: i32,
    pub low_stock_threshold: i32,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    #[must_use]
    pub const fn is_low(&self) -> bool {
        self.quantity <= self.low_stock_threshold
    }
}

/// An audit row for one stock change.
#[derive(Debug, Clone, Serialize)]
pub struct Movement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub delta: i32,
    pub quantity_after: i32,
    pub kind: MovementKind,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub actor_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/admin/inventory/adjust`.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustStock {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub delta: i32,
    #[serde(default)]
    pub note: Option<String>,
}

/// Body of `PUT /api/admin/inventory/set`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetStock {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i32,
    #[serde(default)]
    pub low_stock_threshold: Option<i32>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Body of `POST /api/admin/inventory/transfer`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferStock {
    pub product_id: ProductId,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub quantity: i32,
    #[serde(default)]
    pub note: Option<String>,
}

/// Both sides of a completed transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub reference: Uuid,
    pub from: Movement,
    pub to: Movement,
}

/// Movement history filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub kind: Option<MovementKind>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_warehouse_default_priority() {
        let body: NewWarehouse =
            serde_json::from_str(r#"{"code": "EU1", "name": "Rotterdam"}"#).unwrap();
        assert_eq!(body.priority, 100);
        assert!(body.location.is_none());
    }

    #[test]
    fn test_movement_filter_parses_kind() {
        let filter: MovementFilter =
            serde_json::from_str(r#"{"kind": "transfer_out", "product_id": 4}"#).unwrap();
        assert_eq!(filter.kind, Some(MovementKind::TransferOut));
        assert_eq!(filter.product_id, Some(ProductId::new(4)));
    }
}
