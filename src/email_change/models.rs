//! Pending email change records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use uuid::Uuid;

use super::signed_url::signed_verification_url;

/// Entity type recorded for accounts in the `users` table.
pub const USER_ENTITY_TYPE: &str = "user";

/// Tagged reference to the owning entity (type + id).
///
/// Ownership is polymorphic at the storage level so other account-like
/// entities can reuse the table; lookups resolve the type to its backing
/// table (currently only [`USER_ENTITY_TYPE`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub entity_type: String,
    pub entity_id: Uuid,
}

impl UserRef {
    #[must_use]
    pub fn user(entity_id: Uuid) -> Self {
        Self {
            entity_type: USER_ENTITY_TYPE.to_string(),
            entity_id,
        }
    }
}

/// An unconfirmed email change: candidate address plus its opaque token.
///
/// Rows are immutable once written; they disappear either on activation
/// (their own or a sibling's targeting the same address) or via the prune
/// worker once expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEmailChange {
    pub id: Uuid,
    pub user_type: String,
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for PendingEmailChange {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_type: row.try_get("user_type")?,
            user_id: row.try_get("user_id")?,
            email: row.try_get("email")?,
            token: row.try_get("token")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl PendingEmailChange {
    #[must_use]
    pub fn user_ref(&self) -> UserRef {
        UserRef {
            entity_type: self.user_type.clone(),
            entity_id: self.user_id,
        }
    }

    /// True iff the record has reached `created_at + window`.
    #[must_use]
    pub fn is_expired(&self, window_minutes: i64) -> bool {
        self.is_expired_at(Utc::now(), window_minutes)
    }

    pub(crate) fn is_expired_at(&self, now: DateTime<Utc>, window_minutes: i64) -> bool {
        now >= self.created_at + Duration::minutes(window_minutes)
    }

    #[must_use]
    pub fn expires_at(&self, window_minutes: i64) -> DateTime<Utc> {
        self.created_at + Duration::minutes(window_minutes)
    }

    /// Signed verification link for this record, valid for `window_minutes`
    /// from now (not from `created_at`; the link's own expiry is re-checked
    /// on presentation and activation re-checks the record's).
    #[must_use]
    pub fn verification_url(
        &self,
        frontend_base_url: &str,
        panel_id: &str,
        window_minutes: i64,
        secret: &[u8],
    ) -> String {
        signed_verification_url(
            frontend_base_url,
            panel_id,
            &self.token,
            Utc::now() + Duration::minutes(window_minutes),
            secret,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(created_at: DateTime<Utc>) -> PendingEmailChange {
        PendingEmailChange {
            id: Uuid::new_v4(),
            user_type: USER_ENTITY_TYPE.to_string(),
            user_id: Uuid::new_v4(),
            email: "new@x.com".to_string(),
            token: "token".to_string(),
            created_at,
        }
    }

    #[test]
    fn expiry_boundary_with_default_window() {
        // Created at T with a 60-minute window: fresh at T+59m, expired at
        // T+61m, and expired exactly at T+60m.
        let t0 = Utc::now();
        let record = record(t0);

        assert!(!record.is_expired_at(t0 + Duration::minutes(59), 60));
        assert!(record.is_expired_at(t0 + Duration::minutes(60), 60));
        assert!(record.is_expired_at(t0 + Duration::minutes(61), 60));
    }

    #[test]
    fn expiry_honors_configured_window() {
        let t0 = Utc::now();
        let record = record(t0);

        assert!(!record.is_expired_at(t0 + Duration::minutes(59), 120));
        assert!(!record.is_expired_at(t0 + Duration::minutes(119), 120));
        assert!(record.is_expired_at(t0 + Duration::minutes(120), 120));
    }

    #[test]
    fn expires_at_matches_window() {
        let t0 = Utc::now();
        let record = record(t0);
        assert_eq!(record.expires_at(60), t0 + Duration::minutes(60));
    }

    #[test]
    fn user_ref_round_trip() {
        let record = record(Utc::now());
        let user = record.user_ref();
        assert_eq!(user.entity_type, USER_ENTITY_TYPE);
        assert_eq!(user.entity_id, record.user_id);
        assert_eq!(UserRef::user(record.user_id), user);
    }

    #[test]
    fn verification_url_contains_token() {
        let record = record(Utc::now());
        let url = record.verification_url("https://custodia.dev", "app", 60, b"secret");
        assert!(url.contains("token=token"));
        assert!(url.starts_with("https://custodia.dev/app/pending-email/verify?"));
    }
}
