//! Transactional email over SMTP.
//!
//! Order confirmations, shipping notices and password reset links. Bodies
//! are plain text.

use std::fmt::Write as _;

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use url::Url;

use crate::config::EmailConfig;
use crate::models::order::OrderDetail;

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    base_url: Url,
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig, base_url: Url) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            base_url,
        })
    }

    /// Send the order confirmation.
    ///
    /// # Errors
    ///
    /// Returns error if the email fails to send.
    pub async fn send_order_confirmation(
        &self,
        to: &str,
        order: &OrderDetail,
    ) -> Result<(), EmailError> {
        let subject = format!("Order {} confirmed", order.order.order_number);
        self.send_text_email(to, &subject, &order_confirmation_body(order))
            .await
    }

    /// Tell the customer their order is on its way.
    ///
    /// # Errors
    ///
    /// Returns error if the email fails to send.
    pub async fn send_order_shipped(
        &self,
        to: &str,
        order_number: &str,
        tracking_number: Option<&str>,
    ) -> Result<(), EmailError> {
        let subject = format!("Order {order_number} has shipped");
        self.send_text_email(to, &subject, &shipped_body(order_number, tracking_number))
            .await
    }

    /// Send a password reset link.
    ///
    /// # Errors
    ///
    /// Returns error if the email fails to send.
    pub async fn send_password_reset(&self, to: &str, token: &str) -> Result<(), EmailError> {
        let link = reset_link(&self.base_url, token);
        let body = format!(
            "Someone asked to reset the password for this account.\n\n\
             Set a new password here (valid for one hour):\n{link}\n\n\
             If that wasn't you, ignore this email.\n"
        );
        self.send_text_email(to, "Reset your password", &body).await
    }

    async fn send_text_email(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

fn reset_link(base_url: &Url, token: &str) -> String {
    let mut url = base_url.clone();
    url.set_path("/reset-password");
    url.query_pairs_mut().clear().append_pair("token", token);
    url.to_string()
}

fn order_confirmation_body(detail: &OrderDetail) -> String {
    let order = &detail.order;
    let mut body = format!(
        "Thanks for your order!\n\nOrder number: {}\n\n",
        order.order_number
    );

    for item in &detail.items {
        let _ = writeln!(
            body,
            "{} x {} ({}, {}) @ {}",
            item.quantity, item.product_name, item.size, item.color, item.unit_price
        );
    }

    let _ = write!(
        body,
        "\nSubtotal: {}\nTax: {}\nShipping: {}\nTotal: {}\n\nShipping to:\n{}\n{}\n{} {}\n{}\n",
        order.subtotal,
        order.tax,
        order.shipping,
        order.total,
        order.shipping_address.name,
        order.shipping_address.line1,
        order.shipping_address.postal_code,
        order.shipping_address.city,
        order.shipping_address.country,
    );
    body
}

fn shipped_body(order_number: &str, tracking_number: Option<&str>) -> String {
    let mut body = format!("Good news: order {order_number} is on its way.\n");
    if let Some(tracking) = tracking_number {
        let _ = writeln!(body, "\nTracking number: {tracking}");
    }
    body
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_link_encodes_token() {
        let base = Url::parse("https://shop.example.com/some/path").unwrap();
        let link = reset_link(&base, "ab-c_D");
        assert_eq!(link, "https://shop.example.com/reset-password?token=ab-c_D");
    }

    #[test]
    fn test_shipped_body_tracking() {
        assert!(shipped_body("MS-1", Some("1Z999")).contains("Tracking number: 1Z999"));
        assert!(!shipped_body("MS-1", None).contains("Tracking"));
    }
}
