//! Activation of a pending email change.
//!
//! Both preconditions (address still free, link still fresh) are
//! re-validated here at confirmation time rather than trusted from
//! issuance, because either can change between the request and the click:
//! another account may claim the address, or the link may simply go stale.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::models::{PendingEmailChange, UserRef};
use super::repo::PendingEmailRepo;
use crate::api::email::enqueue_email;
use crate::api::handlers::auth::state::AppConfig;
use crate::api::handlers::auth::utils::{generate_change_token, is_unique_violation};
use crate::events::{DomainEvent, EventBus};

/// Why an activation was refused.
///
/// `EmailTaken` and `LinkExpired` are the two causes of an invalid
/// verification link; HTTP callers see both as the same 400 family and must
/// not depend on anything beyond the message text.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("Email already taken")]
    EmailTaken,
    #[error("Invalid verification link")]
    LinkExpired,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result of a successful activation.
#[derive(Debug, Clone)]
pub struct Activated {
    pub user_id: Uuid,
    pub original_email: String,
}

/// Outcome of a change request.
#[derive(Debug)]
pub enum RequestOutcome {
    Created(PendingEmailChange),
    EmailTaken,
}

/// Record a requested email change and enqueue its verification email.
///
/// The pending record and the outbox row are written in one transaction, so
/// a recorded request always has a mail on the way. The uniqueness check
/// here is a courtesy to the caller; activation re-checks it regardless.
///
/// # Errors
/// Returns error if the database fails or no unique token could be
/// produced.
pub async fn request_change(
    pool: &PgPool,
    config: &AppConfig,
    user: &UserRef,
    email: &str,
) -> anyhow::Result<RequestOutcome> {
    let table = config.pending_email_table();

    for _ in 0..3 {
        let token = generate_change_token()?;
        let mut tx = pool
            .begin()
            .await
            .context("failed to begin email change transaction")?;

        if PendingEmailRepo::email_taken(&mut tx, email).await? {
            let _ = tx.rollback().await;
            return Ok(RequestOutcome::EmailTaken);
        }

        let record = match PendingEmailRepo::create_in_tx(&mut tx, table, user, email, &token).await
        {
            Ok(record) => record,
            Err(err) if is_unique_violation(&err) => {
                let _ = tx.rollback().await;
                continue;
            }
            Err(err) => return Err(err).context("failed to insert pending email change"),
        };

        let verify_url = record.verification_url(
            config.frontend_base_url(),
            config.panel_id(),
            config.email_change_ttl_minutes(),
            config.url_signing_key(),
        );
        enqueue_email(
            &mut tx,
            email,
            "email_change_verification",
            &serde_json::json!({
                "email": email,
                "verify_url": verify_url,
            }),
        )
        .await?;

        tx.commit()
            .await
            .context("failed to commit email change transaction")?;
        return Ok(RequestOutcome::Created(record));
    }

    Err(anyhow!("failed to generate unique email change token"))
}

/// Precondition check shared by activation: a taken address wins over
/// expiry, so a stale link for a claimed address reports the claim.
pub(crate) fn ensure_activatable(
    record: &PendingEmailChange,
    email_taken: bool,
    now: DateTime<Utc>,
    window_minutes: i64,
) -> Result<(), ActivationError> {
    if email_taken {
        return Err(ActivationError::EmailTaken);
    }
    if record.is_expired_at(now, window_minutes) {
        return Err(ActivationError::LinkExpired);
    }
    Ok(())
}

/// Confirm a pending change: swap the user's email, archive the old one,
/// and retire every pending record that targeted the same address.
///
/// All steps run in one transaction; the notification to the old address
/// rides the outbox row written in the same transaction, and the
/// `NewUserEmailVerified` event fires only after commit.
///
/// # Errors
/// Returns [`ActivationError::EmailTaken`] or
/// [`ActivationError::LinkExpired`] for refused activations; anything else
/// (missing user, database failure) is [`ActivationError::Other`].
pub async fn activate(
    pool: &PgPool,
    table: &str,
    record: &PendingEmailChange,
    window_minutes: i64,
    events: &EventBus,
) -> Result<Activated, ActivationError> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin activation transaction")?;

    let taken = PendingEmailRepo::email_taken(&mut tx, &record.email).await?;
    ensure_activatable(record, taken, Utc::now(), window_minutes)?;

    let original_email = PendingEmailRepo::current_email(&mut tx, record.user_id)
        .await?
        .ok_or_else(|| anyhow!("user {} not found for pending email change", record.user_id))?;

    PendingEmailRepo::set_user_email(&mut tx, record.user_id, &record.email).await?;
    PendingEmailRepo::delete_for_email(&mut tx, table, &record.email).await?;
    PendingEmailRepo::archive_old_email(&mut tx, &record.user_ref(), &original_email).await?;

    enqueue_email(
        &mut tx,
        &original_email,
        "email_changed_notice",
        &serde_json::json!({
            "old_email": original_email,
            "new_email": record.email,
        }),
    )
    .await?;

    tx.commit()
        .await
        .context("failed to commit activation transaction")?;

    events.emit(&DomainEvent::NewUserEmailVerified {
        user_id: record.user_id,
        original_email: original_email.clone(),
    });

    Ok(Activated {
        user_id: record.user_id,
        original_email,
    })
}
