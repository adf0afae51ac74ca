//! Checkout route handler.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::error::{Created, Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::order::{CheckoutRequest, CheckoutResult};
use crate::services::CheckoutService;
use crate::state::AppState;

/// Turn the signed-in user's cart into an order.
///
/// POST /api/checkout
///
/// Card orders answer with the Stripe client secret for confirming the
/// payment in the browser.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CheckoutRequest>,
) -> Result<Created<CheckoutResult>> {
    let result = CheckoutService::from_state(&state)
        .place_order(user.id, &body)
        .await?;

    tracing::info!(
        order_id = %result.order.order.id,
        order_number = %result.order.order.order_number,
        total = %result.order.order.total,
        "Order placed"
    );
    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_number", &result.order.order.order_number)]),
    );

    Ok(Created(result))
}
