//! Stripe webhook handler.

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::error::{AppError, Result};
use crate::services::{CheckoutService, PaymentError};
use crate::state::AppState;

/// Handle a Stripe event.
///
/// POST /api/webhooks/stripe
///
/// The raw body is needed for signature verification, so it is taken as a
/// string and parsed only after the signature checks out.
#[instrument(skip(state, headers, body))]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".into()))?;

    let stripe = state.stripe().ok_or(PaymentError::NotConfigured)?;
    let event = stripe.verify_webhook(&body, signature, chrono::Utc::now().timestamp())?;

    debug!(event_id = %event.id, event_type = %event.event_type, "Stripe signature verified");

    CheckoutService::from_state(&state)
        .apply_payment_event(&event)
        .await?;

    Ok(Json(json!({ "received": true })))
}
