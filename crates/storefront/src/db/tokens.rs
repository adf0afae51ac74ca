//! Bearer tokens and password reset tokens.
//!
//! Only SHA-256 digests of tokens are stored; the raw token is shown to the
//! client once and never persisted.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use marketstall_core::{ApiTokenId, UserId};

use super::RepositoryError;

/// Repository for API and password reset tokens.
pub struct TokenRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenRepository<'a> {
    /// Create a new token repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a new bearer token digest.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_api_token(
        &self,
        user_id: UserId,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<ApiTokenId, RepositoryError> {
        let id = sqlx::query_scalar::<_, ApiTokenId>(
            r"
            INSERT INTO shop.api_token (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(self.pool)
        .await?;

        Ok(id)
    }

    /// Resolve an unexpired bearer token to its user, recording the use.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn touch_api_token(&self, token_hash: &[u8]) -> Result<Option<UserId>, RepositoryError> {
        let user_id = sqlx::query_scalar::<_, UserId>(
            r"
            UPDATE shop.api_token
            SET last_used_at = now()
            WHERE token_hash = $1 AND expires_at > now()
            RETURNING user_id
            ",
        )
        .bind(token_hash)
        .fetch_optional(self.pool)
        .await?;

        Ok(user_id)
    }

    /// Delete a bearer token. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn revoke_api_token(&self, token_hash: &[u8]) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM shop.api_token WHERE token_hash = $1")
            .bind(token_hash)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Delete every bearer token of a user (after a password change).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn revoke_all_for_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.api_token WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Store a password reset token digest.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_reset_token(
        &self,
        user_id: UserId,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO shop.password_reset_token (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Mark a reset token used and return its user.
    ///
    /// Returns `None` if the token is unknown, expired or already used. A
    /// token can be consumed at most once even under concurrent requests.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn consume_reset_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<UserId>, RepositoryError> {
        let user_id = sqlx::query_scalar::<_, UserId>(
            r"
            UPDATE shop.password_reset_token
            SET used_at = now()
            WHERE token_hash = $1 AND used_at IS NULL AND expires_at > now()
            RETURNING user_id
            ",
        )
        .bind(token_hash)
        .fetch_optional(self.pool)
        .await?;

        Ok(user_id)
    }

    /// Delete expired bearer tokens and old reset tokens.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let tokens = sqlx::query("DELETE FROM shop.api_token WHERE expires_at <= now()")
            .execute(self.pool)
            .await?;
        let resets = sqlx::query(
            "DELETE FROM shop.password_reset_token WHERE expires_at <= now() - interval '1 day'",
        )
        .execute(self.pool)
        .await?;

        Ok(tokens.rows_affected() + resets.rows_affected())
    }
}
