//! Stored WebAuthn credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use uuid::Uuid;

/// A registered WebAuthn credential.
///
/// `credential_id` is unique across the whole system, not per user.
/// `passkey_data` is the serialized `webauthn-rs` credential; this service
/// never inspects its contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebauthnKey {
    pub id: Uuid,
    pub user_type: String,
    pub user_id: Uuid,
    pub credential_id: Vec<u8>,
    pub label: String,
    pub passkey_data: Vec<u8>,
    pub attachment: Option<String>,
    pub is_passkey: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for WebauthnKey {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_type: row.try_get("user_type")?,
            user_id: row.try_get("user_id")?,
            credential_id: row.try_get("credential_id")?,
            label: row.try_get("label")?,
            passkey_data: row.try_get("passkey_data")?,
            attachment: row.try_get("attachment")?,
            is_passkey: row.try_get("is_passkey")?,
            created_at: row.try_get("created_at")?,
            last_used_at: row.try_get("last_used_at")?,
        })
    }
}
