//! Stock levels and inventory movements.
//!
//! Every stock change runs inside a transaction that locks the affected
//! `stock_level` rows (`SELECT ... FOR UPDATE`) before reading them, so
//! concurrent changes to the same product and warehouse serialize instead of
//! overwriting each other. Each change appends one `inventory_movement` row.
//!
//! The `*_in` functions take an open connection so checkout and order
//! cancellation can include stock changes in their own transactions.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use marketstall_core::{
    AllocationPlan, MovementId, MovementKind, OrderId, OrderItemId, ProductId, UserId,
    WarehouseId, WarehouseStock, plan_allocation,
};

use super::{RepositoryError, page_bounds};
use crate::models::inventory::{Movement, MovementFilter, StockLevel, TransferResult};
use crate::models::{Page, Pagination};

const MOVEMENT_COLUMNS: &str =
    "id, product_id, warehouse_id, delta, quantity_after, kind, reference, note, actor_id, created_at";

const STOCK_SELECT: &str = r"
    SELECT s.product_id, p.name AS product_name, s.warehouse_id, w.code AS warehouse_code,
           s.quantity, s.low_stock_threshold, s.updated_at
    FROM shop.stock_level s
    JOIN shop.product p ON p.id = s.product_id
    JOIN shop.warehouse w ON w.id = s.warehouse_id
";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: i32,
    product_id: i32,
    warehouse_id: i32,
    delta: i32,
    quantity_after: i32,
    kind: MovementKind,
    reference: Option<String>,
    note: Option<String>,
    actor_id: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<MovementRow> for Movement {
    fn from(row: MovementRow) -> Self {
        Self {
            id: MovementId::new(row.id),
            product_id: ProductId::new(row.product_id),
            warehouse_id: WarehouseId::new(row.warehouse_id),
            delta: row.delta,
            quantity_after: row.quantity_after,
            kind: row.kind,
            reference: row.reference,
            note: row.note,
            actor_id: row.actor_id.map(UserId::new),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockLevelRow {
    product_id: i32,
    product_name: String,
    warehouse_id: i32,
    warehouse_code: String,
    quantity: i32,
    low_stock_threshold: i32,
    updated_at: DateTime<Utc>,
}

impl From<StockLevelRow> for StockLevel {
    fn from(row: StockLevelRow) -> Self {
        Self {
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            warehouse_id: WarehouseId::new(row.warehouse_id),
            warehouse_code: row.warehouse_code,
            quantity: row.quantity,
            low_stock_threshold: row.low_stock_threshold,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AllocationRow {
    product_id: i32,
    warehouse_id: i32,
    quantity: i32,
}

/// Who made a change and why, recorded on each movement.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementContext<'n> {
    pub reference: Option<&'n str>,
    pub note: Option<&'n str>,
    pub actor: Option<UserId>,
}

// =============================================================================
// Transaction Building Blocks
// =============================================================================

/// Fail with `NotFound` unless the product exists.
async fn ensure_product(conn: &mut PgConnection, product_id: ProductId) -> Result<(), RepositoryError> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM shop.product WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&mut *conn)
            .await?;

    if exists {
        Ok(())
    } else {
        Err(RepositoryError::NotFound)
    }
}

/// Return whether a warehouse is active, or `NotFound`.
async fn warehouse_is_active(
    conn: &mut PgConnection,
    warehouse_id: WarehouseId,
) -> Result<bool, RepositoryError> {
    sqlx::query_scalar::<_, bool>("SELECT is_active FROM shop.warehouse WHERE id = $1 FOR SHARE")
        .bind(warehouse_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Find or create the stock level row and lock it. Returns the quantity.
async fn lock_level(
    conn: &mut PgConnection,
    product_id: ProductId,
    warehouse_id: WarehouseId,
) -> Result<i32, RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO shop.stock_level (product_id, warehouse_id, quantity)
        VALUES ($1, $2, 0)
        ON CONFLICT (product_id, warehouse_id) DO NOTHING
        ",
    )
    .bind(product_id)
    .bind(warehouse_id)
    .execute(&mut *conn)
    .await?;

    let quantity = sqlx::query_scalar::<_, i32>(
        r"
        SELECT quantity FROM shop.stock_level
        WHERE product_id = $1 AND warehouse_id = $2
        FOR UPDATE
        ",
    )
    .bind(product_id)
    .bind(warehouse_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(quantity)
}

/// Add `delta` to a stock level and append the movement.
///
/// # Errors
///
/// Returns `RepositoryError::InsufficientStock` if the result would be
/// negative; nothing is written in that case.
pub(crate) async fn apply_delta_in(
    conn: &mut PgConnection,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    delta: i32,
    kind: MovementKind,
    ctx: MovementContext<'_>,
) -> Result<Movement, RepositoryError> {
    let current = lock_level(conn, product_id, warehouse_id).await?;

    let after = current
        .checked_add(delta)
        .filter(|after| *after >= 0)
        .ok_or(RepositoryError::InsufficientStock {
            product_id,
            requested: delta.saturating_neg(),
            available: i64::from(current),
        })?;

    sqlx::query(
        r"
        UPDATE shop.stock_level
        SET quantity = $3, updated_at = now()
        WHERE product_id = $1 AND warehouse_id = $2
        ",
    )
    .bind(product_id)
    .bind(warehouse_id)
    .bind(after)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, MovementRow>(&format!(
        r"
        INSERT INTO shop.inventory_movement
            (product_id, warehouse_id, delta, quantity_after, kind, reference, note, actor_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {MOVEMENT_COLUMNS}
        "
    ))
    .bind(product_id)
    .bind(warehouse_id)
    .bind(delta)
    .bind(after)
    .bind(kind)
    .bind(ctx.reference)
    .bind(ctx.note)
    .bind(ctx.actor)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Movement::from(row))
}

/// Take stock for one order line from active warehouses by priority.
///
/// The candidate rows are locked before planning, the plan is applied as
/// `order_placed` movements, and the allocation is recorded against the line
/// so cancellation can return it.
///
/// # Errors
///
/// Returns `RepositoryError::InsufficientStock` if active warehouses together
/// hold less than `quantity`.
pub(crate) async fn allocate_order_item_in(
    conn: &mut PgConnection,
    order_id: OrderId,
    order_item_id: OrderItemId,
    product_id: ProductId,
    quantity: i32,
    actor: Option<UserId>,
) -> Result<AllocationPlan, RepositoryError> {
    let rows = sqlx::query_as::<_, (WarehouseId, i32)>(
        r"
        SELECT s.warehouse_id, s.quantity
        FROM shop.stock_level s
        JOIN shop.warehouse w ON w.id = s.warehouse_id
        WHERE s.product_id = $1 AND w.is_active
        ORDER BY w.priority, w.id
        FOR UPDATE OF s
        ",
    )
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    let available: Vec<WarehouseStock> = rows
        .into_iter()
        .map(|(warehouse_id, quantity)| WarehouseStock {
            warehouse_id,
            quantity,
        })
        .collect();

    let plan = plan_allocation(&available, quantity).map_err(|shortfall| {
        RepositoryError::InsufficientStock {
            product_id,
            requested: shortfall.requested,
            available: shortfall.available,
        }
    })?;

    let reference = order_id.to_string();
    for take in &plan {
        apply_delta_in(
            conn,
            product_id,
            take.warehouse_id,
            -take.quantity,
            MovementKind::OrderPlaced,
            MovementContext {
                reference: Some(&reference),
                note: None,
                actor,
            },
        )
        .await?;

        sqlx::query(
            r"
            INSERT INTO shop.order_item_allocation (order_item_id, warehouse_id, quantity)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(order_item_id)
        .bind(take.warehouse_id)
        .bind(take.quantity)
        .execute(&mut *conn)
        .await?;
    }

    Ok(plan)
}

/// Return an order's allocated stock to the warehouses it came from.
///
/// Writes one `order_cancelled` movement per allocation. The caller must
/// guarantee this runs once per order (the status transition does).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub(crate) async fn restore_order_in(
    conn: &mut PgConnection,
    order_id: OrderId,
    actor: Option<UserId>,
) -> Result<Vec<Movement>, RepositoryError> {
    let allocations = sqlx::query_as::<_, AllocationRow>(
        r"
        SELECT i.product_id, a.warehouse_id, a.quantity
        FROM shop.order_item_allocation a
        JOIN shop.order_item i ON i.id = a.order_item_id
        WHERE i.order_id = $1
        ORDER BY i.product_id, a.warehouse_id
        ",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    let reference = order_id.to_string();
    let mut movements = Vec::with_capacity(allocations.len());
    for allocation in allocations {
        let movement = apply_delta_in(
            conn,
            ProductId::new(allocation.product_id),
            WarehouseId::new(allocation.warehouse_id),
            allocation.quantity,
            MovementKind::OrderCancelled,
            MovementContext {
                reference: Some(&reference),
                note: None,
                actor,
            },
        )
        .await?;
        movements.push(movement);
    }

    Ok(movements)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for stock levels, transfers and movement history.
pub struct InventoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> InventoryRepository<'a> {
    /// Create a new inventory repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Add `delta` units (negative to remove) to a product in a warehouse.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product or warehouse doesn't exist.
    /// Returns `RepositoryError::InsufficientStock` if the result would be negative.
    pub async fn adjust(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        delta: i32,
        note: Option<&str>,
        actor: Option<UserId>,
    ) -> Result<Movement, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        ensure_product(&mut tx, product_id).await?;
        warehouse_is_active(&mut tx, warehouse_id).await?;

        let movement = apply_delta_in(
            &mut tx,
            product_id,
            warehouse_id,
            delta,
            MovementKind::Adjustment,
            MovementContext {
                reference: None,
                note,
                actor,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            product_id = %product_id,
            warehouse_id = %warehouse_id,
            delta,
            quantity_after = movement.quantity_after,
            "Stock adjusted"
        );

        Ok(movement)
    }

    /// Set an absolute count, recorded as an adjustment of the difference.
    ///
    /// Returns `None` when the count was already correct. The low-stock
    /// threshold is updated when given.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product or warehouse doesn't exist.
    pub async fn set(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i32,
        low_stock_threshold: Option<i32>,
        note: Option<&str>,
        actor: Option<UserId>,
    ) -> Result<Option<Movement>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        ensure_product(&mut tx, product_id).await?;
        warehouse_is_active(&mut tx, warehouse_id).await?;

        let current = lock_level(&mut tx, product_id, warehouse_id).await?;

        if let Some(threshold) = low_stock_threshold {
            sqlx::query(
                r"
                UPDATE shop.stock_level SET low_stock_threshold = $3
                WHERE product_id = $1 AND warehouse_id = $2
                ",
            )
            .bind(product_id)
            .bind(warehouse_id)
            .bind(threshold)
            .execute(&mut *tx)
            .await?;
        }

        let movement = if quantity == current {
            None
        } else {
            Some(
                apply_delta_in(
                    &mut tx,
                    product_id,
                    warehouse_id,
                    quantity - current,
                    MovementKind::Adjustment,
                    MovementContext {
                        reference: None,
                        note,
                        actor,
                    },
                )
                .await?,
            )
        };

        tx.commit().await?;

        Ok(movement)
    }

    /// Move stock between two active warehouses.
    ///
    /// Both rows are locked in ascending warehouse order so opposite
    /// transfers of the same product cannot deadlock. The two movements share
    /// one transfer reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product or a warehouse doesn't exist.
    /// Returns `RepositoryError::Conflict` if a warehouse is inactive.
    /// Returns `RepositoryError::InsufficientStock` if the source holds too little.
    pub async fn transfer(
        &self,
        product_id: ProductId,
        from: WarehouseId,
        to: WarehouseId,
        quantity: i32,
        note: Option<&str>,
        actor: Option<UserId>,
    ) -> Result<TransferResult, RepositoryError> {
        if from == to {
            return Err(RepositoryError::Conflict(
                "source and destination warehouse must differ".to_owned(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        ensure_product(&mut tx, product_id).await?;
        for warehouse_id in [from, to] {
            if !warehouse_is_active(&mut tx, warehouse_id).await? {
                return Err(RepositoryError::Conflict(format!(
                    "warehouse {warehouse_id} is inactive"
                )));
            }
        }

        let (first, second) = if from < to { (from, to) } else { (to, from) };
        lock_level(&mut tx, product_id, first).await?;
        lock_level(&mut tx, product_id, second).await?;

        let reference = Uuid::new_v4();
        let reference_text = reference.to_string();
        let ctx = MovementContext {
            reference: Some(&reference_text),
            note,
            actor,
        };

        let out = apply_delta_in(
            &mut tx,
            product_id,
            from,
            -quantity,
            MovementKind::TransferOut,
            ctx,
        )
        .await?;
        let into = apply_delta_in(&mut tx, product_id, to, quantity, MovementKind::TransferIn, ctx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            product_id = %product_id,
            from = %from,
            to = %to,
            quantity,
            reference = %reference,
            "Stock transferred"
        );

        Ok(TransferResult {
            reference,
            from: out,
            to: into,
        })
    }

    /// Stock of one product in every warehouse that has a record for it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stock_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockLevel>, RepositoryError> {
        let rows = sqlx::query_as::<_, StockLevelRow>(&format!(
            "{STOCK_SELECT} WHERE s.product_id = $1 ORDER BY w.priority, w.id"
        ))
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(StockLevel::from).collect())
    }

    /// Stock of every product held in a warehouse.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stock_by_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockLevel>, RepositoryError> {
        let rows = sqlx::query_as::<_, StockLevelRow>(&format!(
            "{STOCK_SELECT} WHERE s.warehouse_id = $1 ORDER BY p.name, p.id"
        ))
        .bind(warehouse_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(StockLevel::from).collect())
    }

    /// Stock levels at or below their threshold in active warehouses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn low_stock(&self) -> Result<Vec<StockLevel>, RepositoryError> {
        let rows = sqlx::query_as::<_, StockLevelRow>(&format!(
            r"
            {STOCK_SELECT}
            WHERE s.quantity <= s.low_stock_threshold AND w.is_active AND p.is_active
            ORDER BY s.quantity, p.name
            "
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(StockLevel::from).collect())
    }

    /// Number of low stock levels (see [`Self::low_stock`]).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_low_stock(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COUNT(*)
            FROM shop.stock_level s
            JOIN shop.product p ON p.id = s.product_id
            JOIN shop.warehouse w ON w.id = s.warehouse_id
            WHERE s.quantity <= s.low_stock_threshold AND w.is_active AND p.is_active
            ",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// Movement history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn movements(
        &self,
        filter: &MovementFilter,
    ) -> Result<Page<Movement>, RepositoryError> {
        let (limit, offset) = page_bounds(filter.page, filter.limit, 50);
        let condition = r"
            WHERE ($1::INTEGER IS NULL OR product_id = $1)
              AND ($2::INTEGER IS NULL OR warehouse_id = $2)
              AND ($3::shop.movement_kind IS NULL OR kind = $3)
        ";

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM shop.inventory_movement {condition}"
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(filter.kind)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r"
            SELECT {MOVEMENT_COLUMNS} FROM shop.inventory_movement
            {condition}
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(filter.kind)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(Movement::from).collect(),
            pagination: Pagination::new(limit, offset, total),
        })
    }

    /// Movements written for an order, placement and cancellation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn movements_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Movement>, RepositoryError> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r"
            SELECT {MOVEMENT_COLUMNS} FROM shop.inventory_movement
            WHERE reference = $1 AND kind IN ('order_placed', 'order_cancelled')
            ORDER BY id
            "
        ))
        .bind(order_id.to_string())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Movement::from).collect())
    }
}
