//! Stripe payments over the plain REST API.
//!
//! Creates and cancels PaymentIntents, issues refunds, and verifies webhook
//! signatures. Requests are form-encoded; amounts are in minor units.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument};

use marketstall_core::OrderId;

use crate::config::StripeConfig;

/// Webhooks older than this are rejected.
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Errors from the Stripe API or webhook handling.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Card payments requested but Stripe isn't configured.
    #[error("card payments are not configured")]
    NotConfigured,

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe answered with an error object.
    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Amount cannot be expressed in minor units.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Webhook signature missing, malformed, stale or wrong.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Webhook body is not a Stripe event.
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// The parts of a PaymentIntent the shop uses.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// A verified webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// ID of the PaymentIntent this event is about, if any.
    #[must_use]
    pub fn payment_intent_id(&self) -> Option<&str> {
        let object = &self.data.object;
        if object.get("object").and_then(|o| o.as_str()) == Some("payment_intent") {
            object.get("id").and_then(|id| id.as_str())
        } else {
            object.get("payment_intent").and_then(|id| id.as_str())
        }
    }
}

/// Stripe REST client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    webhook_secret: SecretString,
    api_base: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Http` if the HTTP client cannot be built.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("marketstall/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Create a PaymentIntent for an order.
    ///
    /// The order ID doubles as idempotency key, so a retried checkout step
    /// never creates a second intent.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Stripe rejects the request.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_payment_intent(
        &self,
        order_id: OrderId,
        order_number: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        if amount_minor <= 0 {
            return Err(PaymentError::InvalidAmount(amount_minor.to_string()));
        }

        let amount = amount_minor.to_string();
        let order_id_text = order_id.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", currency),
            ("automatic_payment_methods[enabled]", "true"),
            ("metadata[order_id]", order_id_text.as_str()),
            ("metadata[order_number]", order_number),
            ("description", order_number),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", format!("order-{order_id}-intent"))
            .form(&form)
            .send()
            .await?;

        let intent: PaymentIntent = parse_response(response).await?;
        debug!(payment_intent = %intent.id, "PaymentIntent created");
        Ok(intent)
    }

    /// Cancel a PaymentIntent that has not been paid.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Stripe rejects the request.
    #[instrument(skip(self))]
    pub async fn cancel_payment_intent(&self, payment_intent_id: &str) -> Result<(), PaymentError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/payment_intents/{payment_intent_id}/cancel",
                self.api_base
            ))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&[("cancellation_reason", "abandoned")])
            .send()
            .await?;

        let _: PaymentIntent = parse_response(response).await?;
        Ok(())
    }

    /// Refund a PaymentIntent in full.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Stripe rejects the request.
    #[instrument(skip(self))]
    pub async fn refund(&self, payment_intent_id: &str) -> Result<String, PaymentError> {
        #[derive(Deserialize)]
        struct Refund {
            id: String,
        }

        let response = self
            .client
            .post(format!("{}/v1/refunds", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", format!("refund-{payment_intent_id}"))
            .form(&[("payment_intent", payment_intent_id)])
            .send()
            .await?;

        let refund: Refund = parse_response(response).await?;
        Ok(refund.id)
    }

    /// Verify a `Stripe-Signature` header and parse the event.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidSignature` if the header is malformed,
    /// stale, or no `v1` signature matches.
    pub fn verify_webhook(
        &self,
        payload: &str,
        signature_header: &str,
        now: i64,
    ) -> Result<WebhookEvent, PaymentError> {
        verify_signature(
            self.webhook_secret.expose_secret(),
            payload,
            signature_header,
            now,
        )?;
        Ok(serde_json::from_str(payload)?)
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PaymentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = response
        .json::<StripeErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error.message)
        .unwrap_or_else(|| "unknown error".to_string());

    Err(PaymentError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Check a `t=...,v1=...` header against the payload.
///
/// The signed string is `"{t}.{payload}"`, HMAC-SHA256 with the endpoint
/// secret, hex encoded. Any one matching `v1` entry is accepted.
fn verify_signature(
    secret: &str,
    payload: &str,
    header: &str,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::InvalidSignature("invalid timestamp".to_string()))?;

    if now.abs_diff(ts) > WEBHOOK_TOLERANCE_SECS.unsigned_abs() {
        return Err(PaymentError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature(
            "no v1 signature".to_string(),
        ));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature(
            "signature mismatch".to_string(),
        ))
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// Build a `Stripe-Signature` header for a payload (test helper).
#[cfg(test)]
pub(crate) fn sign_payload(secret: &str, payload: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!());
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_760_000_000;

    #[test]
    fn test_valid_signature() {
        let payload = r#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let header = sign_payload(SECRET, payload, NOW);
        assert!(verify_signature(SECRET, payload, &header, NOW + 10).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = "{}";
        let good = sign_payload(SECRET, payload, NOW);
        let v1 = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v0=ignored,v1={v1}");
        assert!(verify_signature(SECRET, payload, &header, NOW).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = sign_payload(SECRET, r#"{"amount":100}"#, NOW);
        let result = verify_signature(SECRET, r#"{"amount":1}"#, &header, NOW);
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign_payload("whsec_other", "{}", NOW);
        assert!(verify_signature(SECRET, "{}", &header, NOW).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let header = sign_payload(SECRET, "{}", NOW);
        let result = verify_signature(SECRET, "{}", &header, NOW + WEBHOOK_TOLERANCE_SECS + 1);
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_extreme_timestamp_rejected() {
        for header in [
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            let result = verify_signature(SECRET, "{}", header, NOW);
            assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
        }
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_signature(SECRET, "{}", "garbage", NOW).is_err());
        assert!(verify_signature(SECRET, "{}", "t=abc,v1=00", NOW).is_err());
        assert!(verify_signature(SECRET, "{}", &format!("t={NOW}"), NOW).is_err());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_event_payment_intent_id() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"id":"evt_1","type":"payment_intent.succeeded",
                "data":{"object":{"object":"payment_intent","id":"pi_123"}}}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.payment_intent_id(), Some("pi_123"));

        let charge: WebhookEvent = serde_json::from_str(
            r#"{"id":"evt_2","type":"charge.refunded",
                "data":{"object":{"object":"charge","payment_intent":"pi_456"}}}"#,
        )
        .unwrap();
        assert_eq!(charge.payment_intent_id(), Some("pi_456"));
    }
}
