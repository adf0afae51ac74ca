//! Authentication middleware and extractors.
//!
//! A request is authenticated by the session first, then by an
//! `Authorization: Bearer <token>` header. Rejections are JSON errors.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use tower_sessions::Session;

use crate::db::UserRepository;
use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};
use crate::services::AuthService;
use crate::state::AppState;

/// Extractor that requires an authenticated user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.name)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub CurrentUser);

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is signed in.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<CurrentUser>);

/// Extractor that requires an admin.
///
/// The role is re-read from the database so a demotion takes effect at once,
/// even for sessions created before it.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        current_user(parts, &state)
            .await?
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

impl<S> FromRequestParts<S> for OptionalAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(Self(current_user(parts, &state).await?))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let user = current_user(parts, &state)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

        let fresh = AuthService::new(state.pool())
            .get_user(user.id)
            .await
            .map_err(|_| AppError::Unauthorized("Authentication required".to_string()))?;

        if !fresh.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        Ok(Self(CurrentUser::from(&fresh)))
    }
}

/// Resolve the signed-in user from the session or a bearer token.
///
/// A session from before the user's last password change is flushed.
async fn current_user(parts: &Parts, state: &AppState) -> Result<Option<CurrentUser>, AppError> {
    if let Some(session) = parts.extensions.get::<Session>()
        && let Some(user) = session
            .get::<CurrentUser>(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten()
    {
        let generation = UserRepository::new(state.pool())
            .session_generation(user.id)
            .await?;
        if user.is_current(generation) {
            return Ok(Some(user));
        }

        tracing::info!(user_id = %user.id, "Stale session ended");
        if let Err(err) = session.flush().await {
            tracing::warn!(error = %err, "Failed to flush stale session");
        }
    }

    let Some(token) = bearer_token(&parts.headers) else {
        return Ok(None);
    };

    let user = AuthService::new(state.pool())
        .authenticate_token(token)
        .await?;

    Ok(user.as_ref().map(CurrentUser::from))
}

/// The token of an `Authorization: Bearer` header, if present.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Helper to set the current user in the session.
///
/// The session ID is cycled first to prevent session fixation.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn headers_with(header: Option<&str>) -> HeaderMap {
        let mut builder = Request::builder().uri("/api/auth/me");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0.headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with(Some("Bearer abc123"))), Some("abc123"));
        assert_eq!(bearer_token(&headers_with(Some("Basic abc123"))), None);
        assert_eq!(bearer_token(&headers_with(Some("Bearer   "))), None);
        assert_eq!(bearer_token(&headers_with(None)), None);
    }

    #[test]
    fn test_session_ends_after_password_change() {
        let user = CurrentUser {
            id: marketstall_core::UserId::new(1),
            email: marketstall_core::Email::parse("jo@example.com").unwrap(),
            name: "Jo".to_string(),
            role: marketstall_core::UserRole::Customer,
            session_generation: 2,
        };

        assert!(user.is_current(Some(2)));
        assert!(!user.is_current(Some(3)));
        assert!(!user.is_current(None));
    }

    #[test]
    fn test_session_without_generation_is_first_generation() {
        let stored = serde_json::json!({
            "id": 1,
            "email": "jo@example.com",
            "name": "Jo",
            "role": "customer",
        });
        let user: CurrentUser = serde_json::from_value(stored).unwrap();
        assert!(user.is_current(Some(0)));
    }
}
