//! Authentication route handlers.
//!
//! Registration, login (session cookie plus bearer token), logout, profile
//! and password management, and emailed password resets.

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use marketstall_core::UserRole;

use crate::error::{ApiResponse, AppError, Created, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::auth::bearer_token;
use crate::middleware::{RequireAuth, clear_current_user, set_current_user, take_guest_cart_key};
use crate::models::{CurrentUser, User};
use crate::services::{AuthService, CartService};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A signed-in user with a bearer token for API clients.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an account and sign it in.
///
/// POST /api/auth/register
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<RegisterRequest>,
) -> Result<Created<AuthResponse>> {
    let auth = AuthService::new(state.pool());
    let user = auth
        .register(&body.name, &body.email, &body.password, UserRole::Customer)
        .await?;

    let response = sign_in(&state, &session, user).await?;
    Ok(Created(response))
}

/// Sign in with email and password.
///
/// POST /api/auth/login
#[instrument(skip(state, session, body))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<ApiResponse<AuthResponse>> {
    let user = AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(ApiResponse::new(sign_in(&state, &session, user).await?))
}

/// Start a session, merge the guest cart and issue a bearer token.
async fn sign_in(state: &AppState, session: &Session, user: User) -> Result<AuthResponse> {
    let guest_cart = take_guest_cart_key(session).await?;
    set_current_user(session, &CurrentUser::from(&user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    if let Some(key) = guest_cart {
        CartService::new(state.pool(), &state.config().pricing)
            .merge_guest(&key, user.id)
            .await?;
    }

    let issued = AuthService::new(state.pool()).issue_token(user.id).await?;

    Ok(AuthResponse {
        user,
        token: issued.token,
        expires_at: issued.expires_at,
    })
}

/// End the session and revoke the presented bearer token.
///
/// POST /api/auth/logout
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Result<ApiResponse<Message>> {
    if let Some(token) = bearer_token(&headers) {
        AuthService::new(state.pool()).revoke_token(token).await?;
    }
    clear_current_user(&session).await?;
    clear_sentry_user();

    Ok(ApiResponse::new(Message {
        message: "Logged out",
    }))
}

/// The signed-in user.
///
/// GET /api/auth/me
#[instrument(skip_all, fields(user_id = %current.id))]
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<ApiResponse<User>> {
    let user = AuthService::new(state.pool()).get_user(current.id).await?;
    Ok(ApiResponse::new(user))
}

/// Change the display name.
///
/// PUT /api/auth/profile
#[instrument(skip(state, session, current, body), fields(user_id = %current.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Json(body): Json<ProfileUpdate>,
) -> Result<ApiResponse<User>> {
    let user = AuthService::new(state.pool())
        .update_name(current.id, &body.name)
        .await?;

    if session
        .get::<CurrentUser>(crate::models::session_keys::CURRENT_USER)
        .await?
        .is_some()
    {
        session
            .insert(
                crate::models::session_keys::CURRENT_USER,
                CurrentUser::from(&user),
            )
            .await?;
    }

    Ok(ApiResponse::new(user))
}

/// Change the password; other sessions and bearer tokens stop working.
///
/// PUT /api/auth/password
#[instrument(skip(state, session, current, body), fields(user_id = %current.id))]
pub async fn change_password(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Json(body): Json<PasswordChange>,
) -> Result<ApiResponse<Message>> {
    let auth = AuthService::new(state.pool());
    auth.change_password(current.id, &body.current_password, &body.new_password)
        .await?;

    // Keep the caller's own session; every other one is now stale.
    if session
        .get::<CurrentUser>(crate::models::session_keys::CURRENT_USER)
        .await?
        .is_some()
    {
        let user = auth.get_user(current.id).await?;
        set_current_user(&session, &CurrentUser::from(&user)).await?;
    }

    Ok(ApiResponse::new(Message {
        message: "Password updated",
    }))
}

/// Email a reset link. Answers the same whether or not the account exists.
///
/// POST /api/auth/forgot-password
#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<ApiResponse<Message>> {
    let started = AuthService::new(state.pool())
        .start_password_reset(&body.email)
        .await?;

    if let Some((user, token)) = started {
        match state.email() {
            Some(email) => {
                let email = email.clone();
                let to = user.email.into_inner();
                tokio::spawn(async move {
                    if let Err(err) = email.send_password_reset(&to, &token).await {
                        tracing::warn!(error = %err, "Password reset email failed");
                    }
                });
            }
            None => tracing::warn!(user_id = %user.id, "Email not configured, reset link not sent"),
        }
    }

    Ok(ApiResponse::new(Message {
        message: "If an account exists for that email, a reset link has been sent",
    }))
}

/// Set a new password with a reset token.
///
/// POST /api/auth/reset-password
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<ApiResponse<Message>> {
    if body.token.trim().is_empty() {
        return Err(AppError::BadRequest("Reset token is required".to_string()));
    }

    AuthService::new(state.pool())
        .reset_password(body.token.trim(), &body.password)
        .await?;

    Ok(ApiResponse::new(Message {
        message: "Password has been reset",
    }))
}
