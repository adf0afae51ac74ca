//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions, and keeps the
//! key that identifies a guest's cart.

use sqlx::PgPool;
use tower_sessions::{Expiry, Session, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;
use crate::models::session_keys;
use crate::services::auth::generate_token;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "ms_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// # Arguments
///
/// * `pool` - `PostgreSQL` connection pool
/// * `config` - Storefront configuration (for the cookie's secure flag)
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> SessionManagerLayer<PostgresStore> {
    // The sessions table is created by `ms-cli migrate`
    let store = PostgresStore::new(pool.clone());

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// The guest cart key held by this session.
///
/// With `create`, a new random key is stored when the session has none.
///
/// # Errors
///
/// Returns an error if the session cannot be read or written.
pub async fn guest_cart_key(
    session: &Session,
    create: bool,
) -> Result<Option<String>, tower_sessions::session::Error> {
    if let Some(key) = session.get::<String>(session_keys::GUEST_CART).await? {
        return Ok(Some(key));
    }
    if !create {
        return Ok(None);
    }

    let key = generate_token();
    session.insert(session_keys::GUEST_CART, &key).await?;
    Ok(Some(key))
}

/// Remove the guest cart key, returning it.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn take_guest_cart_key(
    session: &Session,
) -> Result<Option<String>, tower_sessions::session::Error> {
    session.remove::<String>(session_keys::GUEST_CART).await
}
