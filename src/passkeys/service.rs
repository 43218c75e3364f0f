//! Passkey registration service.
//!
//! Coordinates the `WebAuthn` ceremony and the bookkeeping that follows a
//! successful registration:
//! 1) Issue a creation challenge bound to the user, excluding credentials
//!    they already registered.
//! 2) Hold the in-progress registration state in memory with a short TTL.
//! 3) Verify the authenticator response, persist the credential with
//!    `is_passkey` set, and only then invalidate the cached "has passkeys"
//!    flag and mark the account two-factor enabled.
//!
//! A persistence failure propagates to the caller with no bookkeeping done,
//! so there is never a cache or flag ahead of a stored credential.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;
use webauthn_rs::prelude::*;

use super::models::WebauthnKey;
use super::repo::WebauthnKeyRepo;
use crate::email_change::UserRef;
use crate::events::{DomainEvent, EventBus};

const DEFAULT_CHALLENGE_TTL_SECONDS: u64 = 300;
const RP_NAME: &str = "Custodia";

/// Why a registration could not be completed.
///
/// Ceremony-level refusals (`SessionNotFound`, `Verification`) are the
/// client's fault; `Other` covers persistence and bookkeeping failures.
#[derive(Debug, Error)]
pub enum PasskeyRegistrationError {
    #[error("Registration session not found or expired")]
    SessionNotFound,
    #[error("Passkey verification failed")]
    Verification(#[from] WebauthnError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

struct RegistrationState {
    user_id: Uuid,
    registration: PasskeyRegistration,
    created_at: Instant,
}

pub struct PasskeyService {
    webauthn: Webauthn,
    pool: PgPool,
    table: String,
    events: Arc<EventBus>,
    challenge_ttl: Duration,
    reg_states: Mutex<HashMap<Uuid, RegistrationState>>,
    has_passkeys_cache: Mutex<HashMap<Uuid, bool>>,
}

impl PasskeyService {
    /// Create a new passkey service.
    ///
    /// # Errors
    /// Returns error if the relying-party origin is invalid or the
    /// `WebAuthn` builder fails.
    pub fn new(
        pool: PgPool,
        rp_id: &str,
        rp_origin: &str,
        table: String,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let rp_origin_url = Url::parse(rp_origin).context("invalid relying-party origin")?;
        let webauthn = WebauthnBuilder::new(rp_id, &rp_origin_url)?
            .rp_name(RP_NAME)
            .build()?;

        Ok(Self {
            webauthn,
            pool,
            table,
            events,
            challenge_ttl: Duration::from_secs(DEFAULT_CHALLENGE_TTL_SECONDS),
            reg_states: Mutex::new(HashMap::new()),
            has_passkeys_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Starts registration of a new passkey for the user.
    ///
    /// # Errors
    /// Returns error if the database query fails or challenge generation
    /// fails.
    pub async fn register_begin(
        &self,
        user_id: Uuid,
        user_email: &str,
    ) -> Result<(CreationChallengeResponse, Uuid)> {
        // Exclude already-registered credentials so an authenticator is not
        // enrolled twice.
        let existing = WebauthnKeyRepo::list_user_keys(
            &self.pool,
            &self.table,
            &UserRef::user(user_id),
        )
        .await?;
        let exclude: Vec<CredentialID> = existing
            .into_iter()
            .map(|key| key.credential_id.into())
            .collect();

        self.begin_with_exclusions(user_id, user_email, exclude).await
    }

    pub(crate) async fn begin_with_exclusions(
        &self,
        user_id: Uuid,
        user_email: &str,
        exclude: Vec<CredentialID>,
    ) -> Result<(CreationChallengeResponse, Uuid)> {
        let (challenge, registration) = self.webauthn.start_passkey_registration(
            user_id,
            user_email,
            user_email,
            Some(exclude),
        )?;

        let reg_id = Uuid::new_v4();
        let mut states = self.reg_states.lock().await;
        states.retain(|_, state| state.created_at.elapsed() < self.challenge_ttl);
        states.insert(
            reg_id,
            RegistrationState {
                user_id,
                registration,
                created_at: Instant::now(),
            },
        );

        Ok((challenge, reg_id))
    }

    /// Finishes registration: verify the ceremony, persist, then update the
    /// dependent cache and two-factor flag.
    ///
    /// # Errors
    /// Returns [`PasskeyRegistrationError::SessionNotFound`] or
    /// [`PasskeyRegistrationError::Verification`] for ceremony-level
    /// refusals; persistence failures are
    /// [`PasskeyRegistrationError::Other`].
    pub async fn register_finish(
        &self,
        reg_id: Uuid,
        user_id: Uuid,
        reg_response: &RegisterPublicKeyCredential,
        label: &str,
        attachment: Option<&str>,
    ) -> Result<WebauthnKey, PasskeyRegistrationError> {
        let state = self
            .take_registration(reg_id)
            .await
            .ok_or(PasskeyRegistrationError::SessionNotFound)?;
        if state.user_id != user_id {
            return Err(PasskeyRegistrationError::SessionNotFound);
        }

        let passkey = self
            .webauthn
            .finish_passkey_registration(reg_response, &state.registration)?;

        let key = WebauthnKeyRepo::create_key(
            &self.pool,
            &self.table,
            &UserRef::user(user_id),
            passkey.cred_id().as_slice(),
            &serde_json::to_vec(&passkey).context("failed to serialize passkey")?,
            label,
            attachment,
            true,
        )
        .await?;

        self.invalidate_has_passkeys(user_id).await;
        WebauthnKeyRepo::mark_two_factor_enabled(&self.pool, user_id).await?;

        self.events.emit(&DomainEvent::PasskeyRegistered {
            user_id,
            credential_id: key.credential_id.clone(),
        });

        Ok(key)
    }

    /// Whether the user has any passkeys, answered from the per-user cache
    /// when warm.
    ///
    /// # Errors
    /// Returns error if the database query fails on a cache miss.
    pub async fn has_passkeys(&self, user_id: Uuid) -> Result<bool> {
        {
            let cache = self.has_passkeys_cache.lock().await;
            if let Some(cached) = cache.get(&user_id) {
                return Ok(*cached);
            }
        }

        let has_keys =
            WebauthnKeyRepo::has_passkeys(&self.pool, &self.table, &UserRef::user(user_id)).await?;
        let mut cache = self.has_passkeys_cache.lock().await;
        cache.insert(user_id, has_keys);
        Ok(has_keys)
    }

    pub(crate) async fn invalidate_has_passkeys(&self, user_id: Uuid) {
        let mut cache = self.has_passkeys_cache.lock().await;
        cache.remove(&user_id);
    }

    async fn take_registration(&self, reg_id: Uuid) -> Option<RegistrationState> {
        let mut states = self.reg_states.lock().await;
        states
            .remove(&reg_id)
            .filter(|state| state.created_at.elapsed() < self.challenge_ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn service() -> Result<PasskeyService> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(crate::events::LogSubscriber));
        PasskeyService::new(
            pool,
            "custodia.dev",
            "https://custodia.dev",
            "webauthn_keys".to_string(),
            Arc::new(bus),
        )
    }

    #[tokio::test]
    async fn registration_state_is_single_use() -> Result<()> {
        let service = service()?;
        let user_id = Uuid::new_v4();
        let (_challenge, reg_id) = service
            .begin_with_exclusions(user_id, "alice@example.com", Vec::new())
            .await?;

        assert!(service.take_registration(reg_id).await.is_some());
        assert!(service.take_registration(reg_id).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn expired_registration_state_is_not_returned() -> Result<()> {
        let mut service = service()?;
        service.challenge_ttl = Duration::from_secs(0);
        let (_challenge, reg_id) = service
            .begin_with_exclusions(Uuid::new_v4(), "alice@example.com", Vec::new())
            .await?;

        assert!(service.take_registration(reg_id).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn finish_rejects_state_from_another_user() -> Result<()> {
        let service = service()?;
        let (challenge, reg_id) = service
            .begin_with_exclusions(Uuid::new_v4(), "alice@example.com", Vec::new())
            .await?;
        drop(challenge);

        // A well-formed response is irrelevant here: the user check fires
        // before ceremony verification.
        let response: RegisterPublicKeyCredential = serde_json::from_value(serde_json::json!({
            "id": "AAAA",
            "rawId": "AAAA",
            "type": "public-key",
            "extensions": {},
            "response": {
                "attestationObject": "AAAA",
                "clientDataJSON": "AAAA"
            }
        }))?;
        let result = service
            .register_finish(reg_id, Uuid::new_v4(), &response, "YubiKey", None)
            .await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_clears_cached_flag() -> Result<()> {
        let service = service()?;
        let user_id = Uuid::new_v4();
        {
            let mut cache = service.has_passkeys_cache.lock().await;
            cache.insert(user_id, true);
        }
        assert!(service.has_passkeys(user_id).await?);

        service.invalidate_has_passkeys(user_id).await;
        let cache = service.has_passkeys_cache.lock().await;
        assert!(!cache.contains_key(&user_id));
        Ok(())
    }
}
