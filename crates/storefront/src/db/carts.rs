//! Cart repository.
//!
//! A cart belongs either to a user or to a guest session key, never both.
//! Items are unique per product, size and color; adding the same variant again
//! increases its quantity.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use marketstall_core::{CartId, CartItemId, ProductId, UserId};

use super::RepositoryError;
use crate::models::cart::{CartItem, CartOwner, MAX_LINE_QUANTITY};

const ITEM_SELECT: &str = r"
    SELECT i.id, i.product_id, p.name AS product_name, p.slug AS product_slug,
           p.images[1] AS image, i.quantity, i.size, i.color, i.unit_price
    FROM shop.cart_item i
    JOIN shop.product p ON p.id = i.product_id
";

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    id: i32,
    product_id: i32,
    product_name: String,
    product_slug: String,
    image: Option<String>,
    quantity: i32,
    size: String,
    color: String,
    unit_price: Decimal,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: CartItemId::new(row.id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            product_slug: row.product_slug,
            image: row.image,
            quantity: row.quantity,
            line_total: row.unit_price * Decimal::from(row.quantity),
            size: row.size,
            color: row.color,
            unit_price: row.unit_price,
        }
    }
}

/// A cart line as read at checkout, with the product's current state.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub is_active: bool,
    /// Current catalog price.
    pub price: Decimal,
    pub quantity: i32,
    pub size: String,
    pub color: String,
}

/// Lock a user's cart and read its lines.
///
/// Returns `None` if the user has no cart. Lines are ordered by product so
/// concurrent checkouts lock stock rows in the same order.
pub(crate) async fn lock_user_cart_in(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Option<(CartId, Vec<CheckoutLine>)>, RepositoryError> {
    let Some(cart_id) =
        sqlx::query_scalar::<_, CartId>("SELECT id FROM shop.cart WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?
    else {
        return Ok(None);
    };

    let lines = sqlx::query_as::<_, CheckoutLine>(
        r"
        SELECT i.product_id, p.name AS product_name, p.is_active, p.price,
               i.quantity, i.size, i.color
        FROM shop.cart_item i
        JOIN shop.product p ON p.id = i.product_id
        WHERE i.cart_id = $1
        ORDER BY i.product_id, i.id
        ",
    )
    .bind(cart_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some((cart_id, lines)))
}

/// Delete all lines of a cart.
pub(crate) async fn clear_in(conn: &mut PgConnection, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Repository for cart operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find the owner's cart without creating one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find(&self, owner: &CartOwner) -> Result<Option<CartId>, RepositoryError> {
        let id = match owner {
            CartOwner::User(user_id) => {
                sqlx::query_scalar::<_, CartId>("SELECT id FROM shop.cart WHERE user_id = $1")
                    .bind(*user_id)
                    .fetch_optional(self.pool)
                    .await?
            }
            CartOwner::Guest(key) => {
                sqlx::query_scalar::<_, CartId>("SELECT id FROM shop.cart WHERE session_key = $1")
                    .bind(key)
                    .fetch_optional(self.pool)
                    .await?
            }
        };

        Ok(id)
    }

    /// Find the owner's cart, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(&self, owner: &CartOwner) -> Result<CartId, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get_or_create_in(&mut conn, owner).await
    }

    /// Lines of a cart, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartItemRow>(&format!(
            "{ITEM_SELECT} WHERE i.cart_id = $1 ORDER BY i.created_at, i.id"
        ))
        .bind(cart_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(CartItem::from).collect())
    }

    /// Get one line of a cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let row = sqlx::query_as::<_, CartItemRow>(&format!(
            "{ITEM_SELECT} WHERE i.cart_id = $1 AND i.id = $2"
        ))
        .bind(cart_id)
        .bind(item_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(CartItem::from))
    }

    /// Units of a product already in a cart, across all variants.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn quantity_of(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<i64, RepositoryError> {
        let quantity = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT
            FROM shop.cart_item
            WHERE cart_id = $1 AND product_id = $2
            ",
        )
        .bind(cart_id)
        .bind(product_id)
        .fetch_one(self.pool)
        .await?;

        Ok(quantity)
    }

    /// Units on the line for one variant, 0 if there is none.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn line_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        size: &str,
        color: &str,
    ) -> Result<i32, RepositoryError> {
        let quantity = sqlx::query_scalar::<_, i32>(
            r"
            SELECT quantity FROM shop.cart_item
            WHERE cart_id = $1 AND product_id = $2 AND size = $3 AND color = $4
            ",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(size)
        .bind(color)
        .fetch_optional(self.pool)
        .await?;

        Ok(quantity.unwrap_or(0))
    }

    /// Add units of a variant, merging with an existing line.
    ///
    /// The merged quantity never exceeds `MAX_LINE_QUANTITY`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
        size: &str,
        color: &str,
        unit_price: Decimal,
    ) -> Result<CartItemId, RepositoryError> {
        let id = sqlx::query_scalar::<_, CartItemId>(
            r"
            INSERT INTO shop.cart_item (cart_id, product_id, quantity, size, color, unit_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT cart_item_variant
            DO UPDATE SET quantity = LEAST(shop.cart_item.quantity + EXCLUDED.quantity, $7),
                          unit_price = EXCLUDED.unit_price
            RETURNING id
            ",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .bind(size)
        .bind(color)
        .bind(unit_price)
        .bind(MAX_LINE_QUANTITY)
        .fetch_one(self.pool)
        .await?;

        sqlx::query("UPDATE shop.cart SET updated_at = now() WHERE id = $1")
            .bind(cart_id)
            .execute(self.pool)
            .await?;

        Ok(id)
    }

    /// Replace a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line isn't in the cart.
    pub async fn set_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.cart_item SET quantity = $3 WHERE cart_id = $1 AND id = $2",
        )
        .bind(cart_id)
        .bind(item_id)
        .bind(quantity)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line isn't in the cart.
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1 AND id = $2")
            .bind(cart_id)
            .bind(item_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn clear(&self, cart_id: CartId) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        clear_in(&mut conn, cart_id).await
    }

    /// Move a guest cart's lines into a user's cart and drop the guest cart.
    ///
    /// Lines for the same variant are combined. Returns the number of guest
    /// lines merged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn merge_guest(
        &self,
        guest_key: &str,
        user_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(guest_cart) = sqlx::query_scalar::<_, CartId>(
            "SELECT id FROM shop.cart WHERE session_key = $1 FOR UPDATE",
        )
        .bind(guest_key)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(0);
        };

        let user_cart = get_or_create_in(&mut tx, &CartOwner::User(user_id)).await?;

        let merged = sqlx::query(
            r"
            INSERT INTO shop.cart_item (cart_id, product_id, quantity, size, color, unit_price)
            SELECT $2, product_id, quantity, size, color, unit_price
            FROM shop.cart_item
            WHERE cart_id = $1
            ON CONFLICT ON CONSTRAINT cart_item_variant
            DO UPDATE SET quantity = LEAST(shop.cart_item.quantity + EXCLUDED.quantity, $3)
            ",
        )
        .bind(guest_cart)
        .bind(user_cart)
        .bind(MAX_LINE_QUANTITY)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM shop.cart WHERE id = $1")
            .bind(guest_cart)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(merged)
    }
}

async fn get_or_create_in(
    conn: &mut PgConnection,
    owner: &CartOwner,
) -> Result<CartId, RepositoryError> {
    let id = match owner {
        CartOwner::User(user_id) => {
            sqlx::query_scalar::<_, CartId>(
                r"
                INSERT INTO shop.cart (user_id) VALUES ($1)
                ON CONFLICT (user_id) DO UPDATE SET updated_at = now()
                RETURNING id
                ",
            )
            .bind(*user_id)
            .fetch_one(&mut *conn)
            .await?
        }
        CartOwner::Guest(key) => {
            sqlx::query_scalar::<_, CartId>(
                r"
                INSERT INTO shop.cart (session_key) VALUES ($1)
                ON CONFLICT (session_key) DO UPDATE SET updated_at = now()
                RETURNING id
                ",
            )
            .bind(key)
            .fetch_one(&mut *conn)
            .await?
        }
    };

    Ok(id)
}
