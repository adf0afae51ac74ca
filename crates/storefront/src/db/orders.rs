//! Order repository.
//!
//! Checkout, cancellation and admin status changes each run in one
//! transaction together with the stock movements they cause.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

use marketstall_core::{
    CartLine, CartTotals, InvalidTransition, OrderId, OrderItemId, OrderStatus, PaymentMethod,
    PaymentStatus, PricingRules, ProductId, UserId,
};

use super::carts::{clear_in, lock_user_cart_in};
use super::inventory::{allocate_order_item_in, restore_order_in};
use super::{RepositoryError, page_bounds};
use crate::models::order::{
    Order, OrderDetail, OrderFilter, OrderItem, ShippingAddress, generate_order_number,
};
use crate::models::{Page, Pagination};

const ORDER_COLUMNS: &str = r"
    id, order_number, user_id, status, payment_status, payment_method, payment_intent_id,
    subtotal, tax, shipping, total, ship_name, ship_line1, ship_line2, ship_city,
    ship_region, ship_postal_code, ship_country, ship_phone, tracking_number, notes,
    created_at, updated_at
";

/// Errors from changing an order's status.
#[derive(Debug, Error)]
pub enum OrderUpdateError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl From<sqlx::Error> for OrderUpdateError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Outcome of a status change.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: Order,
    pub previous_status: OrderStatus,
    pub previous_payment: PaymentStatus,
}

/// Shipping address and payment choice for a new order.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub user_id: UserId,
    pub address: &'a ShippingAddress,
    pub payment_method: PaymentMethod,
    pub notes: Option<&'a str>,
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    order_number: String,
    user_id: i32,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    payment_intent_id: Option<String>,
    subtotal: Decimal,
    tax: Decimal,
    shipping: Decimal,
    total: Decimal,
    ship_name: String,
    ship_line1: String,
    ship_line2: Option<String>,
    ship_city: String,
    ship_region: Option<String>,
    ship_postal_code: String,
    ship_country: String,
    ship_phone: Option<String>,
    tracking_number: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            order_number: row.order_number,
            user_id: UserId::new(row.user_id),
            status: row.status,
            payment_status: row.payment_status,
            payment_method: row.payment_method,
            payment_intent_id: row.payment_intent_id,
            subtotal: row.subtotal,
            tax: row.tax,
            shipping: row.shipping,
            total: row.total,
            shipping_address: ShippingAddress {
                name: row.ship_name,
                line1: row.ship_line1,
                line2: row.ship_line2,
                city: row.ship_city,
                region: row.ship_region,
                postal_code: row.ship_postal_code,
                country: row.ship_country,
                phone: row.ship_phone,
            },
            tracking_number: row.tracking_number,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    product_id: i32,
    product_name: String,
    unit_price: Decimal,
    quantity: i32,
    size: String,
    color: String,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            unit_price: row.unit_price,
            quantity: row.quantity,
            size: row.size,
            color: row.color,
        }
    }
}

async fn lock_order_in(
    conn: &mut PgConnection,
    id: OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM shop.order WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(Order::from))
}

async fn items_in(conn: &mut PgConnection, id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, OrderItemRow>(
        r"
        SELECT id, product_id, product_name, unit_price, quantity, size, color
        FROM shop.order_item
        WHERE order_id = $1
        ORDER BY id
        ",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(OrderItem::from).collect())
}

/// Payment status after an order moves to `next`.
const fn payment_after(
    next: OrderStatus,
    method: PaymentMethod,
    current: PaymentStatus,
) -> PaymentStatus {
    match (next, method, current) {
        (OrderStatus::Cancelled, _, PaymentStatus::Paid) => PaymentStatus::Refunded,
        (OrderStatus::Delivered, PaymentMethod::CashOnDelivery, _) => PaymentStatus::Paid,
        _ => current,
    }
}

/// What recording a succeeded payment did to its order.
#[derive(Debug)]
pub enum PaymentSettlement {
    /// The order is now paid.
    Paid(Order),
    /// The order was cancelled first; it is now refunded and the charge must
    /// be refunded.
    RefundDue(Order),
    /// The payment was already recorded.
    Unchanged(Order),
}

/// Order and payment status once a payment succeeds, or `None` when the
/// payment is already settled.
const fn settle_success(
    status: OrderStatus,
    payment: PaymentStatus,
) -> Option<(OrderStatus, PaymentStatus)> {
    match (status, payment) {
        (_, PaymentStatus::Paid | PaymentStatus::Refunded) => None,
        (OrderStatus::Cancelled, _) => Some((OrderStatus::Cancelled, PaymentStatus::Refunded)),
        (OrderStatus::Pending, _) => Some((OrderStatus::Confirmed, PaymentStatus::Paid)),
        (other, _) => Some((other, PaymentStatus::Paid)),
    }
}

/// Repository for orders.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Turn a user's cart into an order.
    ///
    /// Locks the cart, prices it at current catalog prices, writes the order
    /// and its lines, takes stock for every line and empties the cart, all in
    /// one transaction. Returns `None` if the cart is empty.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a product is no longer sold.
    /// Returns `RepositoryError::InsufficientStock` if a line cannot be
    /// covered; nothing is written in that case.
    pub async fn create_from_cart(
        &self,
        input: &NewOrder<'_>,
        rules: &PricingRules,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some((cart_id, lines)) = lock_user_cart_in(&mut tx, input.user_id).await? else {
            return Ok(None);
        };
        if lines.is_empty() {
            return Ok(None);
        }

        if let Some(inactive) = lines.iter().find(|line| !line.is_active) {
            return Err(RepositoryError::Conflict(format!(
                "{} is no longer available",
                inactive.product_name
            )));
        }

        let totals = CartTotals::compute(
            lines.iter().map(|line| CartLine {
                unit_price: line.price,
                quantity: line.quantity,
            }),
            rules,
        );

        let address = input.address;
        let order_id = sqlx::query_scalar::<_, OrderId>(
            r"
            INSERT INTO shop.order (
                order_number, user_id, payment_method, subtotal, tax, shipping, total,
                ship_name, ship_line1, ship_line2, ship_city, ship_region,
                ship_postal_code, ship_country, ship_phone, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
            ",
        )
        .bind(generate_order_number(Utc::now()))
        .bind(input.user_id)
        .bind(input.payment_method)
        .bind(totals.subtotal)
        .bind(totals.tax)
        .bind(totals.shipping)
        .bind(totals.total)
        .bind(address.name.trim())
        .bind(address.line1.trim())
        .bind(address.line2.as_deref())
        .bind(address.city.trim())
        .bind(address.region.as_deref())
        .bind(address.postal_code.trim())
        .bind(address.country.trim())
        .bind(address.phone.as_deref())
        .bind(input.notes)
        .fetch_one(&mut *tx)
        .await?;

        for line in &lines {
            let item_id = sqlx::query_scalar::<_, OrderItemId>(
                r"
                INSERT INTO shop.order_item
                    (order_id, product_id, product_name, unit_price, quantity, size, color)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                ",
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(line.price)
            .bind(line.quantity)
            .bind(&line.size)
            .bind(&line.color)
            .fetch_one(&mut *tx)
            .await?;

            allocate_order_item_in(
                &mut tx,
                order_id,
                item_id,
                line.product_id,
                line.quantity,
                Some(input.user_id),
            )
            .await?;
        }

        clear_in(&mut tx, cart_id).await?;

        let order = lock_order_in(&mut tx, order_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let items = items_in(&mut tx, order_id).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "Order placed"
        );

        Ok(Some(OrderDetail { order, items }))
    }

    /// Get an order with its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_detail(&self, id: OrderId) -> Result<Option<OrderDetail>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = items_in(&mut conn, id).await?;

        Ok(Some(OrderDetail {
            order: Order::from(row),
            items,
        }))
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<Order>, RepositoryError> {
        let (limit, offset) = page_bounds(page, limit, 20);

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM shop.order WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM shop.order
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(Order::from).collect(),
            pagination: Pagination::new(limit, offset, total),
        })
    }

    /// All orders, optionally by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &OrderFilter) -> Result<Page<Order>, RepositoryError> {
        let (limit, offset) = page_bounds(filter.page, filter.limit, 50);

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM shop.order WHERE ($1::shop.order_status IS NULL OR status = $1)",
        )
        .bind(filter.status)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM shop.order
            WHERE ($1::shop.order_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(filter.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(Order::from).collect(),
            pagination: Pagination::new(limit, offset, total),
        })
    }

    /// Move an order to a new status under the transition rules.
    ///
    /// Cancelling returns allocated stock and marks a paid order refunded.
    /// Shipping records the tracking number when given. Delivering a
    /// cash-on-delivery order marks it paid. When `owner` is set, orders of
    /// other users are reported as not found.
    ///
    /// # Errors
    ///
    /// Returns `OrderUpdateError::InvalidTransition` if the rules forbid the change.
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn transition(
        &self,
        id: OrderId,
        next: OrderStatus,
        tracking_number: Option<&str>,
        owner: Option<UserId>,
        actor: Option<UserId>,
    ) -> Result<StatusChange, OrderUpdateError> {
        let mut tx = self.pool.begin().await?;

        let order = lock_order_in(&mut tx, id)
            .await?
            .filter(|order| owner.is_none_or(|user_id| order.user_id == user_id))
            .ok_or(RepositoryError::NotFound)?;

        let next = order.status.transition(next)?;

        if next == OrderStatus::Cancelled {
            restore_order_in(&mut tx, id, actor).await?;
        }

        let payment_status = payment_after(next, order.payment_method, order.payment_status);

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE shop.order SET
                status = $2,
                payment_status = $3,
                tracking_number = COALESCE($4, tracking_number)
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(next)
        .bind(payment_status)
        .bind(tracking_number)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %id,
            from = %order.status,
            to = %next,
            "Order status changed"
        );

        Ok(StatusChange {
            order: Order::from(row),
            previous_status: order.status,
            previous_payment: order.payment_status,
        })
    }

    /// Record the Stripe PaymentIntent created for an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_payment_intent(
        &self,
        id: OrderId,
        payment_intent_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop.order SET payment_intent_id = $2 WHERE id = $1")
            .bind(id)
            .bind(payment_intent_id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Record a succeeded PaymentIntent on its order.
    ///
    /// A pending order is confirmed. An order cancelled while the payment was
    /// in flight is marked refunded instead, and the caller must refund the
    /// charge. Repeated webhook deliveries leave the order unchanged.
    /// Returns `None` for unknown intents.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn mark_paid(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentSettlement>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.order WHERE payment_intent_id = $1 FOR UPDATE"
        ))
        .bind(payment_intent_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = row.map(Order::from) else {
            return Ok(None);
        };

        let Some((status, payment_status)) = settle_success(order.status, order.payment_status)
        else {
            return Ok(Some(PaymentSettlement::Unchanged(order)));
        };

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE shop.order SET status = $2, payment_status = $3
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.id)
        .bind(status)
        .bind(payment_status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let order = Order::from(row);
        Ok(Some(if payment_status == PaymentStatus::Refunded {
            PaymentSettlement::RefundDue(order)
        } else {
            PaymentSettlement::Paid(order)
        }))
    }

    /// Mark the order of a failed PaymentIntent as failed.
    ///
    /// Paid or refunded orders are left alone. Returns the order if it changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_payment_failed(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE shop.order SET payment_status = 'failed'
            WHERE payment_intent_id = $1 AND payment_status IN ('pending', 'failed')
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(payment_intent_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Order::from))
    }

    /// Whether a user has a delivered order containing a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_delivered_purchase(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS(
                SELECT 1
                FROM shop.order o
                JOIN shop.order_item i ON i.order_id = o.id
                WHERE o.user_id = $1 AND i.product_id = $2 AND o.status = 'delivered'
            )
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Order counts and paid revenue: `(total, pending, revenue)`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn totals(&self) -> Result<(i64, i64, Decimal), RepositoryError> {
        let totals = sqlx::query_as::<_, (i64, i64, Decimal)>(
            r"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'pending'),
                   COALESCE(SUM(total) FILTER (WHERE payment_status = 'paid'), 0)
            FROM shop.order
            ",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelling_paid_order_refunds() {
        assert_eq!(
            payment_after(OrderStatus::Cancelled, PaymentMethod::Card, PaymentStatus::Paid),
            PaymentStatus::Refunded
        );
        assert_eq!(
            payment_after(OrderStatus::Cancelled, PaymentMethod::Card, PaymentStatus::Pending),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn test_cash_on_delivery_paid_when_delivered() {
        assert_eq!(
            payment_after(
                OrderStatus::Delivered,
                PaymentMethod::CashOnDelivery,
                PaymentStatus::Pending
            ),
            PaymentStatus::Paid
        );
        assert_eq!(
            payment_after(OrderStatus::Shipped, PaymentMethod::CashOnDelivery, PaymentStatus::Pending),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn test_payment_success_confirms_pending_order() {
        assert_eq!(
            settle_success(OrderStatus::Pending, PaymentStatus::Pending),
            Some((OrderStatus::Confirmed, PaymentStatus::Paid))
        );
        assert_eq!(
            settle_success(OrderStatus::Confirmed, PaymentStatus::Failed),
            Some((OrderStatus::Confirmed, PaymentStatus::Paid))
        );
    }

    #[test]
    fn test_payment_success_on_cancelled_order_is_refunded() {
        assert_eq!(
            settle_success(OrderStatus::Cancelled, PaymentStatus::Pending),
            Some((OrderStatus::Cancelled, PaymentStatus::Refunded))
        );
    }

    #[test]
    fn test_settled_payment_unchanged() {
        assert_eq!(settle_success(OrderStatus::Confirmed, PaymentStatus::Paid), None);
        assert_eq!(settle_success(OrderStatus::Cancelled, PaymentStatus::Refunded), None);
    }
}
