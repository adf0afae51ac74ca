//! Integration tests for Marketstall.
//!
//! The tests talk to a running storefront over HTTP and use the database
//! directly only to promote test users to admin.
//!
//! # Running Tests
//!
//! ```bash
//! ms-cli migrate
//! cargo run -p marketstall-storefront &
//! cargo test -p marketstall-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_TEST_URL` - server base URL (default `http://localhost:3000`)
//! - `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`) - same database as the server
//! - `STRIPE_WEBHOOK_SECRET` - when set, signed webhook tests run too

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

/// Password used for every test account.
pub const PASSWORD: &str = "correct-horse-battery";

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("STOREFRONT_TEST_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// A client with its own cookie jar, so each one is a separate browser.
#[must_use]
pub fn browser() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// A unique email for a test account.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

/// A unique upper-case code, e.g. for warehouses.
#[must_use]
pub fn unique_code(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", id.get(..8).unwrap_or(&id)).to_uppercase()
}

/// Connect to the server's database.
pub async fn pool() -> PgPool {
    dotenvy::dotenv().ok();
    let url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("STOREFRONT_DATABASE_URL not set");
    PgPool::connect(&url).await.expect("Failed to connect to database")
}

/// Parse a JSON response, asserting its status.
pub async fn expect_json(response: Response, status: StatusCode) -> Value {
    let actual = response.status();
    let body: Value = response.json().await.expect("response is not JSON");
    assert_eq!(actual, status, "unexpected status, body: {body}");
    body
}

/// `data` of a successful envelope.
pub async fn expect_data(response: Response, status: StatusCode) -> Value {
    let body = expect_json(response, status).await;
    assert_eq!(body["success"], true, "{body}");
    body["data"].clone()
}

/// Register a customer on `client`; returns the `data` of the response.
pub async fn register(client: &Client, email: &str) -> Value {
    let response = client
        .post(format!("{}/api/auth/register", base_url()))
        .json(&json!({ "name": "Test Shopper", "email": email, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    expect_data(response, StatusCode::CREATED).await
}

/// Log `client` in.
pub async fn login(client: &Client, email: &str) -> Value {
    let response = client
        .post(format!("{}/api/auth/login", base_url()))
        .json(&json!({ "email": email, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    expect_data(response, StatusCode::OK).await
}

/// A signed-in admin browser.
pub async fn admin(pool: &PgPool) -> Client {
    let client = browser();
    let email = unique_email("admin");
    register(&client, &email).await;
    sqlx::query("UPDATE shop.user SET role = 'admin' WHERE email = $1")
        .bind(&email)
        .execute(pool)
        .await
        .unwrap();
    client
}

/// Create a warehouse through the admin API; returns its id.
pub async fn create_warehouse(admin: &Client, priority: i32) -> i64 {
    let response = admin
        .post(format!("{}/api/admin/warehouses", base_url()))
        .json(&json!({
            "code": unique_code("WH"),
            "name": "Test warehouse",
            "priority": priority,
        }))
        .send()
        .await
        .unwrap();
    expect_data(response, StatusCode::CREATED).await["id"]
        .as_i64()
        .unwrap()
}

/// Create a product through the admin API; returns `(id, slug)`.
pub async fn create_product(admin: &Client, price: &str, sizes: &[&str]) -> (i64, String) {
    let name = format!("Test Product {}", Uuid::new_v4().simple());
    let response = admin
        .post(format!("{}/api/admin/products", base_url()))
        .json(&json!({
            "name": name,
            "price": price,
            "category": "test",
            "sizes": sizes,
        }))
        .send()
        .await
        .unwrap();
    let data = expect_data(response, StatusCode::CREATED).await;
    (
        data["id"].as_i64().unwrap(),
        data["slug"].as_str().unwrap().to_string(),
    )
}

/// Adjust stock through the admin API.
pub async fn adjust(admin: &Client, product_id: i64, warehouse_id: i64, delta: i32) -> Response {
    admin
        .post(format!("{}/api/admin/inventory/adjust", base_url()))
        .json(&json!({
            "product_id": product_id,
            "warehouse_id": warehouse_id,
            "delta": delta,
        }))
        .send()
        .await
        .unwrap()
}

/// Transfer stock through the admin API.
pub async fn transfer(admin: &Client, product_id: i64, from: i64, to: i64, quantity: i32) -> Response {
    admin
        .post(format!("{}/api/admin/inventory/transfer", base_url()))
        .json(&json!({
            "product_id": product_id,
            "from_warehouse_id": from,
            "to_warehouse_id": to,
            "quantity": quantity,
        }))
        .send()
        .await
        .unwrap()
}

/// Quantity of a product per warehouse id.
pub async fn stock(admin: &Client, product_id: i64) -> Vec<(i64, i64)> {
    let response = admin
        .get(format!(
            "{}/api/admin/inventory/products/{product_id}",
            base_url()
        ))
        .send()
        .await
        .unwrap();
    expect_data(response, StatusCode::OK)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|level| {
            (
                level["warehouse_id"].as_i64().unwrap(),
                level["quantity"].as_i64().unwrap(),
            )
        })
        .collect()
}

/// Quantity of a product in one warehouse (0 when there is no row).
pub async fn stock_in(admin: &Client, product_id: i64, warehouse_id: i64) -> i64 {
    stock(admin, product_id)
        .await
        .into_iter()
        .find(|(id, _)| *id == warehouse_id)
        .map_or(0, |(_, quantity)| quantity)
}

/// A complete shipping address.
#[must_use]
pub fn address() -> Value {
    json!({
        "name": "Test Shopper",
        "line1": "1 Test Street",
        "city": "Testville",
        "postal_code": "12345",
        "country": "US",
        "phone": "555-0100",
    })
}

/// Webhook signing secret shared with the server, if configured.
#[must_use]
pub fn webhook_secret() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("STRIPE_WEBHOOK_SECRET").ok()
}

/// A `Stripe-Signature` header for `payload`, signed now.
#[must_use]
pub fn sign_webhook(secret: &str, payload: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
