//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use marketstall_core::{Email, UserId, UserRole};

/// A shop account (domain type).
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address (lower-cased).
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Permission level.
    pub role: UserRole,
    /// Bumped on password changes to end older sessions.
    #[serde(skip)]
    pub session_generation: i32,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the user may use the admin API.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
