//! Admin account commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a new admin account
//! ADMIN_PASSWORD=... ms-cli admin create -e admin@example.com -n "Admin Name"
//!
//! # Promote an existing customer
//! ms-cli admin promote -e someone@example.com
//! ```

use marketstall_core::{Email, UserRole};
use marketstall_storefront::db::{self, UserRepository};
use marketstall_storefront::services::{AuthError, AuthService};
use thiserror::Error;

use super::{CommandError, database_url};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No account with this email.
    #[error("No account with email: {0}")]
    UserNotFound(String),

    /// Registration rejected (existing email, weak password, ...).
    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("Repository error: {0}")]
    Repository(#[from] db::RepositoryError),
}

/// Create a new admin account.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns `AdminError::Auth` if the email is taken or the password is weak.
pub async fn create_user(email: &str, name: &str, password: &str) -> Result<i32, AdminError> {
    let pool = db::create_pool(&database_url()?).await?;

    tracing::info!("Creating admin user: {}", email);
    let user = AuthService::new(&pool)
        .register(name, email, password, UserRole::Admin)
        .await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );

    Ok(user.id.as_i32())
}

/// Give an existing account the admin role.
///
/// # Errors
///
/// Returns `AdminError::UserNotFound` if no account has this email.
pub async fn promote(email: &str) -> Result<(), AdminError> {
    let parsed = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;

    let pool = db::create_pool(&database_url()?).await?;
    let users = UserRepository::new(&pool);

    let user = users
        .get_by_email(&parsed)
        .await?
        .ok_or_else(|| AdminError::UserNotFound(email.to_owned()))?;

    if user.is_admin() {
        tracing::info!("{} is already an admin", user.email);
        return Ok(());
    }

    users.set_role(user.id, UserRole::Admin).await?;
    tracing::info!("{} is now an admin", user.email);

    Ok(())
}
