//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use marketstall_core::{Email, UserId, UserRole};

use super::user::User;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Role at login time.
    pub role: UserRole,
    /// The user's session generation at login.
    #[serde(default)]
    pub session_generation: i32,
}

impl CurrentUser {
    /// Whether this identity carries the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Whether this session identity is still valid for a user whose
    /// current generation is `generation` (`None` when the user is gone).
    #[must_use]
    pub fn is_current(&self, generation: Option<i32>) -> bool {
        generation == Some(self.session_generation)
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            session_generation: user.session_generation,
        }
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the random key identifying a guest's cart.
    pub const GUEST_CART: &str = "guest_cart";
}
