//! Warehouse stock: adjustments, transfers and the movement log.
//!
//! Requires a running storefront and database; see the crate docs.

use marketstall_integration_tests::{
    adjust, admin, base_url, create_product, create_warehouse, expect_data, expect_json, pool,
    stock_in, transfer,
};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_adjust_writes_one_movement() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "10.00", &[]).await;

    let movement = expect_data(adjust(&admin, product, warehouse, 7).await, StatusCode::CREATED).await;
    assert_eq!(movement["delta"], 7);
    assert_eq!(movement["quantity_after"], 7);
    assert_eq!(movement["kind"], "adjustment");

    let response = admin
        .get(format!(
            "{}/api/admin/inventory/movements?product_id={product}",
            base_url()
        ))
        .send()
        .await
        .unwrap();
    let page = expect_data(response, StatusCode::OK).await;
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_adjust_below_zero_rejected() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "10.00", &[]).await;

    adjust(&admin, product, warehouse, 3).await;
    let body = expect_json(adjust(&admin, product, warehouse, -4).await, StatusCode::CONFLICT).await;
    assert_eq!(body["success"], false);
    assert_eq!(stock_in(&admin, product, warehouse).await, 3);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_concurrent_adjustments_serialize() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let warehouse = create_warehouse(&admin, 10).await;
    let (product, _) = create_product(&admin, "10.00", &[]).await;

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let admin = admin.clone();
            tokio::spawn(async move { adjust(&admin, product, warehouse, 1).await.status() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::CREATED);
    }

    assert_eq!(stock_in(&admin, product, warehouse).await, 20);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_transfer_moves_stock() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let from = create_warehouse(&admin, 10).await;
    let to = create_warehouse(&admin, 20).await;
    let (product, _) = create_product(&admin, "10.00", &[]).await;
    adjust(&admin, product, from, 10).await;

    let response = admin
        .post(format!("{}/api/admin/inventory/transfer", base_url()))
        .json(&json!({
            "product_id": product,
            "from_warehouse_id": from,
            "to_warehouse_id": to,
            "quantity": 4,
        }))
        .send()
        .await
        .unwrap();
    let result = expect_data(response, StatusCode::CREATED).await;
    assert_eq!(result["from"]["delta"], -4);
    assert_eq!(result["to"]["delta"], 4);
    assert_eq!(result["from"]["reference"], result["reference"]);
    assert_eq!(result["to"]["reference"], result["reference"]);

    assert_eq!(stock_in(&admin, product, from).await, 6);
    assert_eq!(stock_in(&admin, product, to).await, 4);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_oversized_transfer_writes_nothing() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let from = create_warehouse(&admin, 10).await;
    let to = create_warehouse(&admin, 20).await;
    let (product, _) = create_product(&admin, "10.00", &[]).await;
    adjust(&admin, product, from, 2).await;

    let response = admin
        .post(format!("{}/api/admin/inventory/transfer", base_url()))
        .json(&json!({
            "product_id": product,
            "from_warehouse_id": from,
            "to_warehouse_id": to,
            "quantity": 3,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    assert_eq!(stock_in(&admin, product, from).await, 2);
    assert_eq!(stock_in(&admin, product, to).await, 0);

    let response = admin
        .get(format!(
            "{}/api/admin/inventory/movements?product_id={product}",
            base_url()
        ))
        .send()
        .await
        .unwrap();
    let page = expect_data(response, StatusCode::OK).await;
    assert_eq!(page["pagination"]["total"], 1);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_transfer_to_inactive_warehouse_rejected() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let from = create_warehouse(&admin, 10).await;
    let to = create_warehouse(&admin, 20).await;
    let (product, _) = create_product(&admin, "10.00", &[]).await;
    adjust(&admin, product, from, 5).await;

    admin
        .delete(format!("{}/api/admin/warehouses/{to}", base_url()))
        .send()
        .await
        .unwrap();

    let response = admin
        .post(format!("{}/api/admin/inventory/transfer", base_url()))
        .json(&json!({
            "product_id": product,
            "from_warehouse_id": from,
            "to_warehouse_id": to,
            "quantity": 1,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(stock_in(&admin, product, from).await, 5);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_concurrent_transfers_cannot_overdraw_source() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let from = create_warehouse(&admin, 10).await;
    let to = create_warehouse(&admin, 20).await;
    let (product, _) = create_product(&admin, "10.00", &[]).await;
    adjust(&admin, product, from, 5).await;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let admin = admin.clone();
            tokio::spawn(async move { transfer(&admin, product, from, to, 4).await.status() })
        })
        .collect();
    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await.unwrap());
    }
    statuses.sort_unstable();

    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
    assert_eq!(stock_in(&admin, product, from).await, 1);
    assert_eq!(stock_in(&admin, product, to).await, 4);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_opposite_transfers_do_not_deadlock() {
    let pool = pool().await;
    let admin = admin(&pool).await;
    let first = create_warehouse(&admin, 10).await;
    let second = create_warehouse(&admin, 20).await;
    let (product, _) = create_product(&admin, "10.00", &[]).await;
    adjust(&admin, product, first, 50).await;
    adjust(&admin, product, second, 50).await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let admin = admin.clone();
            let (from, to) = if i % 2 == 0 { (first, second) } else { (second, first) };
            tokio::spawn(async move { transfer(&admin, product, from, to, 1).await.status() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::CREATED);
    }

    assert_eq!(stock_in(&admin, product, first).await, 50);
    assert_eq!(stock_in(&admin, product, second).await, 50);
}
