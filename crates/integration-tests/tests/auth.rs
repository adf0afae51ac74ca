//! Registration, login and token authentication.
//!
//! Requires a running storefront and database; see the crate docs.

use marketstall_integration_tests::{PASSWORD, base_url, browser, expect_data, expect_json, login, register, unique_email};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_register_then_me() {
    let client = browser();
    let email = unique_email("register");
    let data = register(&client, &email).await;
    assert_eq!(data["user"]["email"], email.as_str());
    assert_eq!(data["user"]["role"], "customer");
    assert!(data["token"].as_str().is_some_and(|t| !t.is_empty()));

    let response = client
        .get(format!("{}/api/auth/me", base_url()))
        .send()
        .await
        .unwrap();
    let me = expect_data(response, StatusCode::OK).await;
    assert_eq!(me["email"], email.as_str());
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_duplicate_email_rejected() {
    let email = unique_email("dup");
    register(&browser(), &email).await;

    let response = browser()
        .post(format!("{}/api/auth/register", base_url()))
        .json(&json!({ "name": "Again", "email": email.to_uppercase(), "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    let body = expect_json(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "An account with this email already exists");
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_bearer_token_and_logout() {
    let email = unique_email("bearer");
    register(&browser(), &email).await;
    let token = login(&browser(), &email).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    // A fresh client without cookies authenticates by token alone.
    let api = reqwest::Client::new();
    let response = api
        .get(format!("{}/api/auth/me", base_url()))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api
        .post(format!("{}/api/auth/logout", base_url()))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api
        .get(format!("{}/api/auth/me", base_url()))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_wrong_password() {
    let email = unique_email("wrong");
    register(&browser(), &email).await;

    let response = browser()
        .post(format!("{}/api/auth/login", base_url()))
        .json(&json!({ "email": email, "password": "not-the-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_customer_cannot_use_admin_api() {
    let client = browser();
    register(&client, &unique_email("nosy")).await;

    let response = client
        .get(format!("{}/api/admin/dashboard", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running storefront server and database"]
async fn test_password_change_ends_other_sessions() {
    let email = unique_email("sessions");
    let phone = browser();
    register(&phone, &email).await;
    let laptop = browser();
    login(&laptop, &email).await;

    let response = phone
        .put(format!("{}/api/auth/password", base_url()))
        .json(&json!({ "current_password": PASSWORD, "new_password": "a-brand-new-passphrase" }))
        .send()
        .await
        .unwrap();
    expect_data(response, StatusCode::OK).await;

    let me = |client: reqwest::Client| async move {
        client
            .get(format!("{}/api/auth/me", base_url()))
            .send()
            .await
            .unwrap()
            .status()
    };
    assert_eq!(me(laptop).await, StatusCode::UNAUTHORIZED);
    assert_eq!(me(phone).await, StatusCode::OK);
}
