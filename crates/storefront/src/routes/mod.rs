//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness check
//! GET  /health/ready                   - Readiness check (database)
//!
//! # Auth
//! POST /api/auth/register              - Create account, sign in
//! POST /api/auth/login                 - Sign in (session + bearer token)
//! POST /api/auth/logout                - Sign out
//! GET  /api/auth/me                    - Current user
//! PUT  /api/auth/profile               - Change display name
//! PUT  /api/auth/password              - Change password
//! POST /api/auth/forgot-password       - Email a reset link
//! POST /api/auth/reset-password        - Reset with token
//!
//! # Catalog
//! GET  /api/products                   - Product listing (filters, sort, pages)
//! GET  /api/products/{slug}            - Product detail
//! GET  /api/products/{slug}/reviews    - Reviews of a product
//! POST /api/products/{slug}/reviews    - Review a product
//! DELETE /api/reviews/{id}             - Delete a review
//! GET  /api/categories                 - Categories with counts
//!
//! # Cart (guest or signed in)
//! GET    /api/cart                     - Cart with totals
//! DELETE /api/cart                     - Empty the cart
//! POST   /api/cart/items               - Add a product
//! PUT    /api/cart/items/{id}          - Change quantity
//! DELETE /api/cart/items/{id}          - Remove a line
//!
//! # Orders (requires auth)
//! POST /api/checkout                   - Place an order from the cart
//! GET  /api/orders                     - Order history
//! GET  /api/orders/{id}                - Order detail
//! POST /api/orders/{id}/cancel         - Cancel an order
//!
//! # Wishlist (requires auth)
//! GET    /api/wishlist                 - Wishlisted products
//! POST   /api/wishlist/{product_id}    - Add
//! DELETE /api/wishlist/{product_id}    - Remove
//!
//! # Webhooks
//! POST /api/webhooks/stripe            - Stripe payment events
//!
//! # Admin (requires admin role)
//! /api/admin/...                       - See [`admin`]
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod products;
pub mod webhooks;
pub mod wishlist;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Create the auth routes router.
///
/// Credential endpoints get the strict rate limiter.
pub fn auth_routes() -> Router<AppState> {
    let limited = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .layer(auth_rate_limiter());

    Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/profile", put(auth::update_profile))
        .route("/password", put(auth::change_password))
        .merge(limited)
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{slug}", get(products::show))
        .route(
            "/{slug}/reviews",
            get(products::reviews).post(products::create_review),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add_item))
        .route(
            "/items/{id}",
            put(cart::update_item).delete(cart::remove_item),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
        .route("/{id}/cancel", post(orders::cancel))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::index))
        .route(
            "/{product_id}",
            post(wishlist::add).delete(wishlist::remove),
        )
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .nest("/auth", auth_routes())
        .nest("/products", product_routes())
        .route("/categories", get(products::categories))
        .route("/reviews/{id}", delete(products::delete_review))
        .nest("/cart", cart_routes())
        .route("/checkout", post(checkout::checkout))
        .nest("/orders", order_routes())
        .nest("/wishlist", wishlist_routes())
        .route("/webhooks/stripe", post(webhooks::stripe))
        .nest("/admin", admin::routes());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    use super::*;

    fn app() -> Router {
        routes()
            .layer(SessionManagerLayer::new(MemoryStore::default()))
            .with_state(AppState::for_tests())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_without_database() {
        let response = app()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_me_requires_auth() {
        let response = app()
            .oneshot(Request::get("/api/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Authentication required");
    }

    #[tokio::test]
    async fn test_checkout_requires_auth() {
        let response = app()
            .oneshot(
                Request::post("/api/checkout")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_requires_auth() {
        let response = app()
            .oneshot(
                Request::get("/api/admin/dashboard")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_guest_cart_is_empty() {
        let response = app()
            .oneshot(Request::get("/api/cart").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["items"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_webhook_without_signature() {
        let response = app()
            .oneshot(
                Request::post("/api/webhooks/stripe")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
