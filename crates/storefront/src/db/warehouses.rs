//! Warehouse repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use marketstall_core::WarehouseId;

use super::RepositoryError;
use crate::models::inventory::{NewWarehouse, Warehouse, WarehouseUpdate};

const WAREHOUSE_COLUMNS: &str = "id, code, name, location, priority, is_active, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct WarehouseRow {
    id: i32,
    code: String,
    name: String,
    location: Option<String>,
    priority: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WarehouseRow> for Warehouse {
    fn from(row: WarehouseRow) -> Self {
        Self {
            id: WarehouseId::new(row.id),
            code: row.code,
            name: row.name,
            location: row.location,
            priority: row.priority,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for warehouses.
pub struct WarehouseRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WarehouseRepository<'a> {
    /// Create a new warehouse repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All warehouses in shipping preference order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Warehouse>, RepositoryError> {
        let rows = sqlx::query_as::<_, WarehouseRow>(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM shop.warehouse ORDER BY priority, id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Warehouse::from).collect())
    }

    /// Get a warehouse by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: WarehouseId) -> Result<Option<Warehouse>, RepositoryError> {
        let row = sqlx::query_as::<_, WarehouseRow>(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM shop.warehouse WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Warehouse::from))
    }

    /// Get a warehouse by its code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Warehouse>, RepositoryError> {
        let row = sqlx::query_as::<_, WarehouseRow>(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM shop.warehouse WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Warehouse::from))
    }

    /// Create a warehouse.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    pub async fn create(&self, input: &NewWarehouse) -> Result<Warehouse, RepositoryError> {
        let row = sqlx::query_as::<_, WarehouseRow>(&format!(
            r"
            INSERT INTO shop.warehouse (code, name, location, priority)
            VALUES ($1, $2, $3, $4)
            RETURNING {WAREHOUSE_COLUMNS}
            "
        ))
        .bind(input.code.trim().to_uppercase())
        .bind(input.name.trim())
        .bind(input.location.as_deref())
        .bind(input.priority)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "warehouse code already exists"))?;

        Ok(Warehouse::from(row))
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the warehouse doesn't exist.
    pub async fn update(
        &self,
        id: WarehouseId,
        update: &WarehouseUpdate,
    ) -> Result<Warehouse, RepositoryError> {
        let row = sqlx::query_as::<_, WarehouseRow>(&format!(
            r"
            UPDATE shop.warehouse SET
                name = COALESCE($2, name),
                location = COALESCE($3, location),
                priority = COALESCE($4, priority),
                is_active = COALESCE($5, is_active)
            WHERE id = $1
            RETURNING {WAREHOUSE_COLUMNS}
            "
        ))
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.location.as_deref())
        .bind(update.priority)
        .bind(update.is_active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(Warehouse::from(row))
    }

    /// Stop shipping from a warehouse. Its stock stays on record.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the warehouse doesn't exist.
    pub async fn deactivate(&self, id: WarehouseId) -> Result<Warehouse, RepositoryError> {
        self.update(
            id,
            &WarehouseUpdate {
                is_active: Some(false),
                ..WarehouseUpdate::default()
            },
        )
        .await
    }
}
