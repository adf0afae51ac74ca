//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::services::{EmailService, PaymentError, ProductCache, StripeClient};

/// Error building the shared state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("stripe client: {0}")]
    Stripe(#[from] PaymentError),
    #[error("smtp transport: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    products: ProductCache,
    stripe: Option<StripeClient>,
    email: Option<EmailService>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Stripe and SMTP clients are built only when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let stripe = config.stripe.as_ref().map(StripeClient::new).transpose()?;
        let email = config
            .email
            .as_ref()
            .map(|email| EmailService::new(email, config.base_url.clone()))
            .transpose()?;

        if stripe.is_none() {
            tracing::warn!("Stripe not configured, card checkout disabled");
        }
        if email.is_none() {
            tracing::warn!("SMTP not configured, emails will be skipped");
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                products: ProductCache::new(),
                stripe,
                email,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Cached product lookups by slug.
    #[must_use]
    pub fn products(&self) -> &ProductCache {
        &self.inner.products
    }

    /// Stripe client, if card payments are configured.
    #[must_use]
    pub fn stripe(&self) -> Option<&StripeClient> {
        self.inner.stripe.as_ref()
    }

    /// Email service, if SMTP is configured.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl AppState {
    /// State over a lazily connected pool; handlers that reach the database fail.
    pub(crate) fn for_tests() -> Self {
        use marketstall_core::PricingRules;
        use secrecy::SecretString;
        use sqlx::postgres::PgPoolOptions;

        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/marketstall_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: url::Url::parse("http://localhost:3000").unwrap(),
            session_secret: SecretString::from("k3J9x-Qm2vTz8Lw4pRn7Ys1Bc6Hd0Fg5"),
            cors_allowed_origin: None,
            pricing: PricingRules::default(),
            currency: "usd".to_string(),
            stripe: None,
            email: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://localhost:1/marketstall_test")
            .unwrap();

        Self::new(config, pool).unwrap()
    }
}
