//! Cart operations with catalog and stock validation.

use sqlx::PgPool;
use thiserror::Error;

use marketstall_core::{CartItemId, PricingRules, ProductId, UserId};

use crate::db::{CartRepository, ProductRepository, RepositoryError};
use crate::models::cart::{AddCartItem, Cart, CartOwner, MAX_LINE_QUANTITY};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity out of range.
    #[error("Quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,

    /// Product missing or inactive.
    #[error("Product is not available")]
    ProductUnavailable,

    /// Size or color the product doesn't come in.
    #[error("{0}")]
    InvalidOption(String),

    /// More units than are in stock.
    #[error("Only {available} in stock")]
    InsufficientStock { requested: i64, available: i64 },

    /// Line not in this cart.
    #[error("Cart item not found")]
    ItemNotFound,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Cart service.
pub struct CartService<'a> {
    carts: CartRepository<'a>,
    products: ProductRepository<'a>,
    rules: &'a PricingRules,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, rules: &'a PricingRules) -> Self {
        Self {
            carts: CartRepository::new(pool),
            products: ProductRepository::new(pool),
            rules,
        }
    }

    /// The owner's cart with totals; empty if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn view(&self, owner: &CartOwner) -> Result<Cart, CartError> {
        let Some(cart_id) = self.carts.find(owner).await? else {
            return Ok(Cart::empty());
        };
        let items = self.carts.items(cart_id).await?;
        Ok(Cart::new(Some(cart_id), items, self.rules))
    }

    /// Add units of a product variant.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ProductUnavailable` for unknown or inactive products,
    /// `CartError::InvalidOption` for sizes/colors not offered,
    /// `CartError::InvalidQuantity` if the line would exceed the per-line cap, and
    /// `CartError::InsufficientStock` if the cart would hold more than is on hand.
    pub async fn add(&self, owner: &CartOwner, input: &AddCartItem) -> Result<Cart, CartError> {
        check_quantity(input.quantity)?;

        let product = self
            .products
            .get_by_id(input.product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(CartError::ProductUnavailable)?;

        let size = input.size.as_deref().unwrap_or("").trim();
        let color = input.color.as_deref().unwrap_or("").trim();
        check_options(&product.sizes, &product.colors, size, color)?;

        let cart_id = self.carts.get_or_create(owner).await?;
        let on_line = self
            .carts
            .line_quantity(cart_id, product.id, size, color)
            .await?;
        check_line_total(on_line, input.quantity)?;
        let in_cart = self.carts.quantity_of(cart_id, product.id).await?;
        check_stock(in_cart + i64::from(input.quantity), product.stock)?;

        self.carts
            .add_item(cart_id, product.id, input.quantity, size, color, product.price)
            .await?;

        tracing::debug!(
            cart_id = %cart_id,
            product_id = %product.id,
            quantity = input.quantity,
            "Item added to cart"
        );

        self.view(owner).await
    }

    /// Change a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the line isn't in the owner's cart
    /// and `CartError::InsufficientStock` if the new quantity exceeds stock.
    pub async fn update(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<Cart, CartError> {
        if quantity == 0 {
            return self.remove(owner, item_id).await;
        }
        check_quantity(quantity)?;

        let cart_id = self.carts.find(owner).await?.ok_or(CartError::ItemNotFound)?;
        let item = self
            .carts
            .item(cart_id, item_id)
            .await?
            .ok_or(CartError::ItemNotFound)?;

        if quantity > item.quantity {
            let stock = self.stock_of(item.product_id).await?;
            let in_cart = self.carts.quantity_of(cart_id, item.product_id).await?;
            check_stock(
                in_cart - i64::from(item.quantity) + i64::from(quantity),
                stock,
            )?;
        }

        self.carts
            .set_quantity(cart_id, item_id, quantity)
            .await
            .map_err(not_found_as_item)?;
        self.view(owner).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the line isn't in the owner's cart.
    pub async fn remove(&self, owner: &CartOwner, item_id: CartItemId) -> Result<Cart, CartError> {
        let cart_id = self.carts.find(owner).await?.ok_or(CartError::ItemNotFound)?;
        self.carts
            .remove_item(cart_id, item_id)
            .await
            .map_err(not_found_as_item)?;
        self.view(owner).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn clear(&self, owner: &CartOwner) -> Result<Cart, CartError> {
        if let Some(cart_id) = self.carts.find(owner).await? {
            self.carts.clear(cart_id).await?;
        }
        self.view(owner).await
    }

    /// Merge a guest cart into a user's cart after sign-in.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn merge_guest(&self, guest_key: &str, user_id: UserId) -> Result<u64, CartError> {
        let merged = self.carts.merge_guest(guest_key, user_id).await?;
        if merged > 0 {
            tracing::info!(user_id = %user_id, lines = merged, "Guest cart merged");
        }
        Ok(merged)
    }

    async fn stock_of(&self, product_id: ProductId) -> Result<i64, CartError> {
        self.products
            .get_by_id(product_id)
            .await?
            .filter(|p| p.is_active)
            .map(|p| p.stock)
            .ok_or(CartError::ProductUnavailable)
    }
}

fn not_found_as_item(err: RepositoryError) -> CartError {
    match err {
        RepositoryError::NotFound => CartError::ItemNotFound,
        other => CartError::Repository(other),
    }
}

const fn check_quantity(quantity: i32) -> Result<(), CartError> {
    if quantity < 1 || quantity > MAX_LINE_QUANTITY {
        return Err(CartError::InvalidQuantity);
    }
    Ok(())
}

/// A line already holding `on_line` units may take `adding` more.
fn check_line_total(on_line: i32, adding: i32) -> Result<(), CartError> {
    on_line
        .checked_add(adding)
        .map_or(Err(CartError::InvalidQuantity), check_quantity)
}

fn check_options(
    sizes: &[String],
    colors: &[String],
    size: &str,
    color: &str,
) -> Result<(), CartError> {
    use crate::models::product::Product;

    if !Product::offers(sizes, size) {
        return Err(CartError::InvalidOption(if size.is_empty() {
            "Please select a size".to_string()
        } else {
            format!("Size '{size}' is not available")
        }));
    }
    if !Product::offers(colors, color) {
        return Err(CartError::InvalidOption(if color.is_empty() {
            "Please select a color".to_string()
        } else {
            format!("Color '{color}' is not available")
        }));
    }
    Ok(())
}

const fn check_stock(requested: i64, available: i64) -> Result<(), CartError> {
    if requested > available {
        return Err(CartError::InsufficientStock {
            requested,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_check_quantity_bounds() {
        assert!(check_quantity(1).is_ok());
        assert!(check_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(matches!(check_quantity(0), Err(CartError::InvalidQuantity)));
        assert!(check_quantity(-2).is_err());
        assert!(check_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_repeated_adds_capped_per_line() {
        assert!(check_line_total(0, MAX_LINE_QUANTITY).is_ok());
        assert!(check_line_total(MAX_LINE_QUANTITY - 1, 1).is_ok());
        assert!(matches!(
            check_line_total(MAX_LINE_QUANTITY, 1),
            Err(CartError::InvalidQuantity)
        ));
        assert!(check_line_total(i32::MAX, 1).is_err());
    }

    #[test]
    fn test_check_options() {
        let sizes = options(&["S", "M"]);
        let colors = options(&[]);

        assert!(check_options(&sizes, &colors, "M", "").is_ok());
        assert!(matches!(
            check_options(&sizes, &colors, "XL", ""),
            Err(CartError::InvalidOption(msg)) if msg.contains("XL")
        ));
        assert!(matches!(
            check_options(&sizes, &colors, "", ""),
            Err(CartError::InvalidOption(msg)) if msg == "Please select a size"
        ));
        assert!(check_options(&sizes, &colors, "S", "red").is_err());
    }

    #[test]
    fn test_check_stock() {
        assert!(check_stock(3, 3).is_ok());
        assert!(matches!(
            check_stock(4, 3),
            Err(CartError::InsufficientStock {
                requested: 4,
                available: 3
            })
        ));
    }
}
