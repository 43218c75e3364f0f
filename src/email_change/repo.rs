//! Database access for pending email changes and their activation steps.
//!
//! The pending-change table name comes from configuration (never from
//! request input), so queries are assembled with `format!` before binding.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{PendingEmailChange, UserRef};

pub struct PendingEmailRepo;

impl PendingEmailRepo {
    /// Insert a new pending change inside the caller's transaction.
    ///
    /// Returns the raw `sqlx` error so the caller can detect a token
    /// unique-constraint collision and retry with a fresh token.
    pub(crate) async fn create_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        table: &str,
        user: &UserRef,
        email: &str,
        token: &str,
    ) -> Result<PendingEmailChange, sqlx::Error> {
        let query = format!(
            r"
            INSERT INTO {table} (user_type, user_id, email, token)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_type, user_id, email, token, created_at
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = %query
        );
        sqlx::query_as::<_, PendingEmailChange>(&query)
            .bind(&user.entity_type)
            .bind(user.entity_id)
            .bind(email)
            .bind(token)
            .fetch_one(&mut **tx)
            .instrument(span)
            .await
    }

    /// # Errors
    /// Returns error if the database query fails.
    pub async fn find_by_token(
        pool: &PgPool,
        table: &str,
        token: &str,
    ) -> Result<Option<PendingEmailChange>> {
        let query = format!(
            "SELECT id, user_type, user_id, email, token, created_at FROM {table} WHERE token = $1"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        sqlx::query_as::<_, PendingEmailChange>(&query)
            .bind(token)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch pending email change")
    }

    /// Pending changes owned by one entity, newest first.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub async fn for_user(
        pool: &PgPool,
        table: &str,
        user: &UserRef,
    ) -> Result<Vec<PendingEmailChange>> {
        let query = format!(
            r"
            SELECT id, user_type, user_id, email, token, created_at
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
        sqlx::query_as::<_, PendingEmailChange>(&query)
            .bind(&user.entity_type)
            .bind(user.entity_id)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to list pending email changes")
    }

    /// Whether any user row already holds this address.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub(crate) async fn email_taken(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        email: &str,
    ) -> Result<bool> {
        let query = "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1) AS taken";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&mut **tx)
            .instrument(span)
            .await
            .context("failed to check email uniqueness")?;
        Ok(row.get("taken"))
    }

    /// # Errors
    /// Returns error if the database query fails.
    pub(crate) async fn current_email(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        user_id: Uuid,
    ) -> Result<Option<String>> {
        let query = "SELECT email FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .instrument(span)
            .await
            .context("failed to fetch current email")?;
        Ok(row.map(|row| row.get("email")))
    }

    /// Write the confirmed address and mark it verified.
    ///
    /// The value comes from a trusted pending record, not request input, so
    /// this path deliberately skips the external-input validation the
    /// request endpoint applies.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub(crate) async fn set_user_email(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        user_id: Uuid,
        email: &str,
    ) -> Result<()> {
        let query = r"
            UPDATE users
            SET email = $2,
                email_verified_at = NOW(),
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
            .bind(email)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to update user email")?;
        Ok(())
    }

    /// Delete every pending change targeting `email`, across all users.
    ///
    /// Run on activation so a second, still-valid token for the same
    /// address cannot later be redeemed against a reassigned email.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub(crate) async fn delete_for_email(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        table: &str,
        email: &str,
    ) -> Result<u64> {
        let query = format!("DELETE FROM {table} WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = %query
        );
        let result = sqlx::query(&query)
            .bind(email)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to delete pending email changes")?;
        Ok(result.rows_affected())
    }

    /// Archive the replaced address so a later revert can restore it.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub(crate) async fn archive_old_email(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        user: &UserRef,
        old_email: &str,
    ) -> Result<()> {
        let query = r"
            INSERT INTO old_user_emails (user_type, user_id, email)
            VALUES ($1, $2, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&user.entity_type)
            .bind(user.entity_id)
            .bind(old_email)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to archive old email")?;
        Ok(())
    }

    /// Garbage-collect records past the expiry window.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub async fn prune_expired(pool: &PgPool, table: &str, window_minutes: i64) -> Result<u64> {
        let query =
            format!("DELETE FROM {table} WHERE created_at < NOW() - ($1 * INTERVAL '1 minute')");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = %query
        );
        let result = sqlx::query(&query)
            .bind(window_minutes)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to prune pending email changes")?;
        Ok(result.rows_affected())
    }
}
