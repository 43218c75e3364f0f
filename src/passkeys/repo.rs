//! Database access for WebAuthn keys and two-factor bookkeeping.
//!
//! The key table name comes from configuration (never from request input),
//! so queries are assembled with `format!` before binding.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::WebauthnKey;
use crate::email_change::UserRef;

pub struct WebauthnKeyRepo;

impl WebauthnKeyRepo {
    /// Persist a verified credential.
    ///
    /// No retries: the credential id is produced by the authenticator and a
    /// collision means the key is already registered somewhere, so the
    /// unique-constraint failure propagates to the caller.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub async fn create_key(
        pool: &PgPool,
        table: &str,
        user: &UserRef,
        credential_id: &[u8],
        passkey_data: &[u8],
        label: &str,
        attachment: Option<&str>,
        is_passkey: bool,
    ) -> Result<WebauthnKey> {
        let query = format!(
            r"
            INSERT INTO {table}
                (user_type, user_id, credential_id, label, passkey_data, attachment, is_passkey)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_type, user_id, credential_id, label, passkey_data, attachment,
                      is_passkey, created_at, last_used_at
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = %query
        );
        sqlx::query_as::<_, WebauthnKey>(&query)
            .bind(&user.entity_type)
            .bind(user.entity_id)
            .bind(credential_id)
            .bind(label)
            .bind(passkey_data)
            .bind(attachment)
            .bind(is_passkey)
            .fetch_one(pool)
            .instrument(span)
            .await
            .context("failed to insert webauthn key")
    }

    /// Lists all keys for a user, newest first.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub async fn list_user_keys(
        pool: &PgPool,
        table: &str,
        user: &UserRef,
    ) -> Result<Vec<WebauthnKey>> {
        let query = format!(
            r"
            SELECT id, user_type, user_id, credential_id, label, passkey_data, attachment,
                   is_passkey, created_at, last_used_at
            FROM {table}
            WHERE user_type = $1 AND user_id = $2
            ORDER BY created_at DESC
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        sqlx::query_as::<_, WebauthnKey>(&query)
            .bind(&user.entity_type)
            .bind(user.entity_id)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to list webauthn keys")
    }

    /// Whether the user owns at least one key flagged as a passkey.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub async fn has_passkeys(pool: &PgPool, table: &str, user: &UserRef) -> Result<bool> {
        let query = format!(
            r"
            SELECT EXISTS (
                SELECT 1 FROM {table}
                WHERE user_type = $1 AND user_id = $2 AND is_passkey
            ) AS has_passkeys
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(&user.entity_type)
            .bind(user.entity_id)
            .fetch_one(pool)
            .instrument(span)
            .await
            .context("failed to check passkey existence")?;
        Ok(row.get("has_passkeys"))
    }

    /// Flip the account's two-factor flag on. Idempotent.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub async fn mark_two_factor_enabled(pool: &PgPool, user_id: Uuid) -> Result<()> {
        let query = r"
            UPDATE users
            SET two_factor_enabled = TRUE,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to mark two-factor enabled")?;
        Ok(())
    }
}
