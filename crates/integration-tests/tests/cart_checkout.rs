//! Guest carts, checkout with stock allocation, and cancellation.
//!
//! Requires a running storefront and database; see the crate docs.

use marketstall_integration_tests::{
    address, adjust, admin, base_url, browser, create_product, create_warehouse, expect_data,
    expect_json, pool, register, sign_webhook, stock_in, unique_email, webhook_secret,
};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

async fn add_to_cart(client: &Client, product_id: i64, quantity: i32, size: &str) -> reqwest::Response {
    client
        .post(format!("{}/api/cart/items", base_url()))
        .json(&json!({ "product_id": product_id, "quantity": quantity, "size": size }))
        .send()
        .await
        .unwrap()
}

async fn cash_checkout(client: &Client) -> reqwest::Response {
    client
        .post(format!("{}/api/checkout", base_url()))
        .json(&json!({
            "shipping_address": address(),
            "payment_method": "cash_on_delivery",
        }))
        .send()
        .await
        .unwrap()
}

fn items(cart: &Value) -> &Vec<Value> {
    cart["items"].as_array().unwrap()
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_same_line_increments_quantity() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "25.00", &["M", "L"]).await;
    adjust(&admin, product, warehouse, 10).await;

    let guest = browser();
    expect_data(add_to_cart(&guest, product, 1, "M").await, StatusCode::OK).await;
    let cart = expect_data(add_to_cart(&guest, product, 2, "M").await, StatusCode::OK).await;
    assert_eq!(items(&cart).len(), 1);
    assert_eq!(items(&cart)[0]["quantity"], 3);

    let cart = expect_data(add_to_cart(&guest, product, 1, "L").await, StatusCode::OK).await;
    assert_eq!(items(&cart).len(), 2);
    assert_eq!(cart["subtotal"], "100.00");
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_unknown_size_and_overstock_rejected() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "5.00", &["M"]).await;
    adjust(&admin, product, warehouse, 2).await;

    let guest = browser();
    let body = expect_json(add_to_cart(&guest, product, 1, "XXL").await, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["success"], false);

    let response = add_to_cart(&guest, product, 3, "M").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_guest_cart_merged_at_login() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "12.00", &[]).await;
    adjust(&admin, product, warehouse, 10).await;

    let email = unique_email("merge");
    register(&browser(), &email).await;

    let shopper = browser();
    expect_data(add_to_cart(&shopper, product, 2, "").await, StatusCode::OK).await;

    let response = shopper
        .post(format!("{}/api/auth/login", base_url()))
        .json(&json!({ "email": email, "password": marketstall_integration_tests::PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = shopper
        .get(format!("{}/api/cart", base_url()))
        .send()
        .await
        .unwrap();
    let cart = expect_data(response, StatusCode::OK).await;
    assert_eq!(items(&cart).len(), 1);
    assert_eq!(items(&cart)[0]["quantity"], 2);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_checkout_allocates_by_priority_and_cancel_restores() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let first = create_warehouse(&admin, 1).await;
    let second = create_warehouse(&admin, 2).await;
    let (product, _) = create_product(&admin, "20.00", &[]).await;
    adjust(&admin, product, first, 2).await;
    adjust(&admin, product, second, 5).await;

    let shopper = browser();
    register(&shopper, &unique_email("checkout")).await;
    expect_data(add_to_cart(&shopper, product, 4, "").await, StatusCode::OK).await;

    let result = expect_data(cash_checkout(&shopper).await, StatusCode::CREATED).await;
    let order = &result["order"];
    assert_eq!(order["status"], "pending");
    assert_eq!(order["subtotal"], "80.00");
    let order_id = order["id"].as_i64().unwrap();

    assert_eq!(stock_in(&admin, product, first).await, 0);
    assert_eq!(stock_in(&admin, product, second).await, 3);

    // The cart is emptied by checkout.
    let response = shopper
        .get(format!("{}/api/cart", base_url()))
        .send()
        .await
        .unwrap();
    assert!(items(&expect_data(response, StatusCode::OK).await).is_empty());

    let response = shopper
        .post(format!("{}/api/orders/{order_id}/cancel", base_url()))
        .send()
        .await
        .unwrap();
    let cancelled = expect_data(response, StatusCode::OK).await;
    assert_eq!(cancelled["status"], "cancelled");

    assert_eq!(stock_in(&admin, product, first).await, 2);
    assert_eq!(stock_in(&admin, product, second).await, 5);

    // A cancelled order cannot move again.
    let response = admin
        .put(format!("{}/api/admin/orders/{order_id}/status", base_url()))
        .json(&json!({ "status": "shipped" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_checkout_with_insufficient_stock_writes_nothing() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "9.00", &[]).await;
    adjust(&admin, product, warehouse, 3).await;

    let shopper = browser();
    register(&shopper, &unique_email("short")).await;
    expect_data(add_to_cart(&shopper, product, 3, "").await, StatusCode::OK).await;

    // Stock disappears between adding to the cart and checking out.
    adjust(&admin, product, warehouse, -2).await;

    let response = cash_checkout(&shopper).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    assert_eq!(stock_in(&admin, product, warehouse).await, 1);
    let response = shopper
        .get(format!("{}/api/orders", base_url()))
        .send()
        .await
        .unwrap();
    let page = expect_data(response, StatusCode::OK).await;
    assert_eq!(page["pagination"]["total"], 0);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_orders_are_private() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "9.00", &[]).await;
    adjust(&admin, product, warehouse, 3).await;

    let owner = browser();
    register(&owner, &unique_email("owner")).await;
    expect_data(add_to_cart(&owner, product, 1, "").await, StatusCode::OK).await;
    let result = expect_data(cash_checkout(&owner).await, StatusCode::CREATED).await;
    let order_id = result["order"]["id"].as_i64().unwrap();

    let other = browser();
    register(&other, &unique_email("other")).await;
    let response = other
        .get(format!("{}/api/orders/{order_id}", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_webhook_with_bad_signature_rejected() {
    let response = reqwest::Client::new()
        .post(format!("{}/api/webhooks/stripe", base_url()))
        .header("Stripe-Signature", "t=1,v1=deadbeef")
        .body(r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{}}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_signed_payment_event_marks_order_paid_once() {
    let Some(secret) = webhook_secret() else {
        return;
    };
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "15.00", &[]).await;
    adjust(&admin, product, warehouse, 5).await;

    let shopper = browser();
    register(&shopper, &unique_email("paid")).await;
    expect_data(add_to_cart(&shopper, product, 1, "").await, StatusCode::OK).await;
    let result = expect_data(cash_checkout(&shopper).await, StatusCode::CREATED).await;
    let order_id = result["order"]["id"].as_i64().unwrap();

    let intent = format!("pi_test_{order_id}_{}", uuid::Uuid::new_v4().simple());
    sqlx::query("UPDATE shop.order SET payment_intent_id = $1 WHERE id = $2")
        .bind(&intent)
        .bind(order_id)
        .execute(&pool)
        .await
        .unwrap();

    let payload = json!({
        "id": "evt_test",
        "type": "payment_intent.succeeded",
        "data": { "object": { "object": "payment_intent", "id": intent } },
    })
    .to_string();

    for _ in 0..2 {
        let response = reqwest::Client::new()
            .post(format!("{}/api/webhooks/stripe", base_url()))
            .header("Stripe-Signature", sign_webhook(&secret, &payload))
            .body(payload.clone())
            .send()
            .await
            .unwrap();
        let body = expect_json(response, StatusCode::OK).await;
        assert_eq!(body["received"], true);
    }

    let response = shopper
        .get(format!("{}/api/orders/{order_id}", base_url()))
        .send()
        .await
        .unwrap();
    let order = expect_data(response, StatusCode::OK).await;
    assert_eq!(order["payment_status"], "paid");
    assert_eq!(order["status"], "confirmed");
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_payment_after_cancellation_is_refunded_not_paid() {
    let Some(secret) = webhook_secret() else {
        return;
    };
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "15.00", &[]).await;
    adjust(&admin, product, warehouse, 5).await;

    let shopper = browser();
    register(&shopper, &unique_email("late")).await;
    expect_data(add_to_cart(&shopper, product, 1, "").await, StatusCode::OK).await;
    let result = expect_data(cash_checkout(&shopper).await, StatusCode::CREATED).await;
    let order_id = result["order"]["id"].as_i64().unwrap();

    let intent = format!("pi_late_{order_id}_{}", uuid::Uuid::new_v4().simple());
    sqlx::query("UPDATE shop.order SET payment_intent_id = $1 WHERE id = $2")
        .bind(&intent)
        .bind(order_id)
        .execute(&pool)
        .await
        .unwrap();

    let response = shopper
        .post(format!("{}/api/orders/{order_id}/cancel", base_url()))
        .send()
        .await
        .unwrap();
    expect_data(response, StatusCode::OK).await;

    let payload = json!({
        "id": "evt_late",
        "type": "payment_intent.succeeded",
        "data": { "object": { "object": "payment_intent", "id": intent } },
    })
    .to_string();
    let response = reqwest::Client::new()
        .post(format!("{}/api/webhooks/stripe", base_url()))
        .header("Stripe-Signature", sign_webhook(&secret, &payload))
        .body(payload)
        .send()
        .await
        .unwrap();
    expect_json(response, StatusCode::OK).await;

    let response = shopper
        .get(format!("{}/api/orders/{order_id}", base_url()))
        .send()
        .await
        .unwrap();
    let order = expect_data(response, StatusCode::OK).await;
    assert_eq!(order["status"], "cancelled");
    assert_eq!(order["payment_status"], "refunded");
    assert_eq!(stock_in(&admin, product, warehouse).await, 5);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_concurrent_first_adds_share_one_cart() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "3.00", &[]).await;
    adjust(&admin, product, warehouse, 50).await;

    let shopper = browser();
    register(&shopper, &unique_email("race")).await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let shopper = shopper.clone();
            tokio::spawn(async move { add_to_cart(&shopper, product, 1, "").await.status() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let response = shopper
        .get(format!("{}/api/cart", base_url()))
        .send()
        .await
        .unwrap();
    let cart = expect_data(response, StatusCode::OK).await;
    assert_eq!(items(&cart).len(), 1);
    assert_eq!(items(&cart)[0]["quantity"], 10);
}
