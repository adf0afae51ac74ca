//! Order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marketstall_core::{
    OrderId, OrderItemId, OrderStatus, PaymentMethod, PaymentStatus, ProductId, UserId,
};

/// Where an order ships to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// Names of required fields that are blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }
}

/// An order header.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order with name and price as they were at checkout.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub size: String,
    pub color: String,
}

/// An order with its lines.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Body of `POST /api/checkout`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Result of a checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResult {
    pub order: OrderDetail,
    /// Stripe client secret for confirming a card payment in the browser.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Admin order listing filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Body of `PUT /api/admin/orders/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DashboardStats {
    pub total_orders: i64,
    pub pending_orders: i64,
    pub paid_revenue: Decimal,
    pub total_products: i64,
    pub total_customers: i64,
    pub low_stock_count: i64,
}

/// Generate a human-facing order number such as `MS-20261017-4F9A2C`.
#[must_use]
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    use rand::Rng;
    let suffix: u32 = rand::rng().random_range(0..0x0100_0000);
    format!("MS-{}-{suffix:06X}", now.format("%Y%m%d"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Ada Lovelace".to_string(),
            line1: "12 Analytical Way".to_string(),
            line2: None,
            city: "London".to_string(),
            region: None,
            postal_code: "N1 9GU".to_string(),
            country: "GB".to_string(),
            phone: None,
        }
    }

    #[test]
    fn test_missing_fields() {
        assert!(address().missing_fields().is_empty());

        let mut incomplete = address();
        incomplete.city = "  ".to_string();
        incomplete.country = String::new();
        assert_eq!(incomplete.missing_fields(), vec!["city", "country"]);
    }

    #[test]
    fn test_checkout_request_defaults_to_card() {
        let body = serde_json::json!({ "shipping_address": address() });
        let request: CheckoutRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.payment_method, PaymentMethod::Card);
        assert!(request.notes.is_none());
    }

    #[test]
    fn test_order_number_format() {
        let now = DateTime::parse_from_rfc3339("2026-10-17T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = generate_order_number(now);
        assert!(number.starts_with("MS-20261017-"));
        assert_eq!(number.len(), "MS-20261017-".len() + 6);
    }
}
