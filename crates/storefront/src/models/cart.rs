//! Cart types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marketstall_core::{CartId, CartItemId, CartLine, CartTotals, PricingRules, ProductId};

/// Largest quantity accepted for a single line.
pub const MAX_LINE_QUANTITY: i32 = 999;

/// Who a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    /// A signed-in user.
    User(marketstall_core::UserId),
    /// A guest, identified by the key stored in their session.
    Guest(String),
}

/// A line in a cart, joined with the product it refers to.
#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_slug: String,
    pub image: Option<String>,
    pub quantity: i32,
    pub size: String,
    pub color: String,
    /// Price captured when the line was added.
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl CartItem {
    #[must_use]
    pub const fn line(&self) -> CartLine {
        CartLine {
            unit_price: self.unit_price,
            quantity: self.quantity,
        }
    }
}

/// A cart with derived totals.
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    /// `None` until the first item is added.
    pub id: Option<CartId>,
    pub items: Vec<CartItem>,
    #[serde(flatten)]
    pub totals: CartTotals,
}

impl Cart {
    /// Build a cart view and compute its totals.
    #[must_use]
    pub fn new(id: Option<CartId>, items: Vec<CartItem>, rules: &PricingRules) -> Self {
        let totals = CartTotals::compute(items.iter().map(CartItem::line), rules);
        Self { id, items, totals }
    }

    /// A cart with no lines.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            id: None,
            items: Vec::new(),
            totals: CartTotals::default(),
        }
    }
}

/// Body of `POST /api/cart/items`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddCartItem {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

const fn default_quantity() -> i32 {
    1
}

/// Body of `PUT /api/cart/items/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCartItem {
    pub quantity: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(price: i64, quantity: i32) -> CartItem {
        let unit_price = Decimal::new(price, 2);
        CartItem {
            id: CartItemId::new(1),
            product_id: ProductId::new(1),
            product_name: "Tee".to_string(),
            product_slug: "tee".to_string(),
            image: None,
            quantity,
            size: String::new(),
            color: String::new(),
            unit_price,
            line_total: unit_price * Decimal::from(quantity),
        }
    }

    #[test]
    fn test_cart_totals_under_threshold() {
        let cart = Cart::new(
            Some(CartId::new(1)),
            vec![item(2500, 2)],
            &PricingRules::default(),
        );
        assert_eq!(cart.totals.subtotal, Decimal::new(5000, 2));
        assert_eq!(cart.totals.tax, Decimal::new(400, 2));
        assert_eq!(cart.totals.shipping, Decimal::new(1000, 2));
        assert_eq!(cart.totals.total, Decimal::new(6400, 2));
    }

    #[test]
    fn test_cart_serializes_totals_flat() {
        let json = serde_json::to_value(Cart::empty()).unwrap();
        assert!(json.get("subtotal").is_some());
        assert_eq!(json["items"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_add_item_defaults_quantity() {
        let body: AddCartItem = serde_json::from_str(r#"{"product_id": 3}"#).unwrap();
        assert_eq!(body.quantity, 1);
        assert!(body.size.is_none());
    }
}
