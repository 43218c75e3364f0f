//! Email change endpoints: request, list, and signed-link verification.
//!
//! Flow Overview:
//! 1) A sudo-elevated session posts the candidate address; a pending record
//!    and its verification mail are written atomically.
//! 2) The candidate address receives a signed, time-limited link.
//! 3) Presenting the link re-validates everything and swaps the address.

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    http::Uri,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use super::auth::{AppConfig, Principal};
use super::auth::utils::{normalize_email, valid_email};
use crate::email_change::signed_url::verify_signed_link;
use crate::email_change::{
    ActivationError, PendingEmailChange, PendingEmailRepo, RequestOutcome, activate,
    request_change,
};
use crate::events::EventBus;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailChangeRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PendingEmailChangeResponse {
    pub id: String,
    pub email: String,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct VerifyEmailChangeParams {
    /// Opaque token from the verification link.
    pub token: String,
    /// Link expiry as a unix timestamp.
    pub expires: i64,
    /// Hex-encoded HMAC signature over token and expiry.
    pub sig: String,
}

fn pending_response(record: &PendingEmailChange, window_minutes: i64) -> PendingEmailChangeResponse {
    PendingEmailChangeResponse {
        id: record.id.to_string(),
        email: record.email.clone(),
        created_at: record.created_at.to_rfc3339(),
        expires_at: record.expires_at(window_minutes).to_rfc3339(),
    }
}

/// Request an email change for the current user.
#[utoipa::path(
    post,
    path = "/v1/me/email",
    request_body = EmailChangeRequest,
    responses(
        (status = 201, description = "Pending email change created", body = PendingEmailChangeResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Missing or invalid session."),
        (status = 409, description = "Email already taken", body = String)
    ),
    tag = "me"
)]
pub async fn request_email_change(
    Extension(principal): Extension<Principal>,
    pool: Extension<PgPool>,
    config: Extension<Arc<AppConfig>>,
    payload: Option<Json<EmailChangeRequest>>,
) -> impl IntoResponse {
    let request: EmailChangeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let user = crate::email_change::UserRef::user(principal.user_id);
    match request_change(&pool, &config, &user, &email).await {
        Ok(RequestOutcome::Created(record)) => (
            StatusCode::CREATED,
            Json(pending_response(
                &record,
                config.email_change_ttl_minutes(),
            )),
        )
            .into_response(),
        Ok(RequestOutcome::EmailTaken) => {
            (StatusCode::CONFLICT, "Email already taken".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to create pending email change: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Email change failed".to_string(),
            )
                .into_response()
        }
    }
}

/// List the current user's pending email changes.
#[utoipa::path(
    get,
    path = "/v1/me/email/pending",
    responses(
        (status = 200, description = "Pending email changes", body = [PendingEmailChangeResponse]),
        (status = 401, description = "Missing or invalid session.")
    ),
    tag = "me"
)]
pub async fn list_pending_changes(
    Extension(principal): Extension<Principal>,
    pool: Extension<PgPool>,
    config: Extension<Arc<AppConfig>>,
) -> impl IntoResponse {
    let user = crate::email_change::UserRef::user(principal.user_id);
    match PendingEmailRepo::for_user(&pool, config.pending_email_table(), &user).await {
        Ok(records) => {
            let window = config.email_change_ttl_minutes();
            let response: Vec<PendingEmailChangeResponse> = records
                .iter()
                .map(|record| pending_response(record, window))
                .collect();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!("Failed to list pending email changes: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Router entry point for the signed verification link.
///
/// axum 0.8's `Query` no longer implements `OptionalFromRequestParts`, so
/// `Option<Query<T>>` can no longer appear directly in a handler signature
/// (axum 0.7 provided a blanket `Option<T>` extractor). This adapter rebuilds
/// that optional value using the exact call `Query`'s extractor makes
/// internally (`try_from_uri`), then delegates to the unchanged
/// `verify_email_change`. A missing or malformed query string yields `None`,
/// preserving the original behavior byte-for-byte.
#[utoipa::path(
    get,
    path = "/v1/pending-email/verify",
    params(VerifyEmailChangeParams),
    responses(
        (status = 204, description = "Email change activated"),
        (status = 400, description = "Invalid or expired verification link", body = String)
    ),
    tag = "me"
)]
pub async fn verify_email_change_route(
    uri: Uri,
    pool: Extension<PgPool>,
    config: Extension<Arc<AppConfig>>,
    events: Extension<Arc<EventBus>>,
) -> impl IntoResponse {
    let params = Query::<VerifyEmailChangeParams>::try_from_uri(&uri).ok();
    verify_email_change(params, pool, config, events).await
}

/// Activate a pending email change from its signed verification link.
pub async fn verify_email_change(
    params: Option<Query<VerifyEmailChangeParams>>,
    pool: Extension<PgPool>,
    config: Extension<Arc<AppConfig>>,
    events: Extension<Arc<EventBus>>,
) -> impl IntoResponse {
    let Some(Query(params)) = params else {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid verification link".to_string(),
        )
            .into_response();
    };

    // The signature gate runs before any database work.
    if !verify_signed_link(
        &params.token,
        params.expires,
        &params.sig,
        config.url_signing_key(),
        Utc::now(),
    ) {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid verification link".to_string(),
        )
            .into_response();
    }

    let table = config.pending_email_table();
    let record = match PendingEmailRepo::find_by_token(&pool, table, &params.token).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                "Invalid verification link".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to fetch pending email change: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    match activate(
        &pool,
        table,
        &record,
        config.email_change_ttl_minutes(),
        &events,
    )
    .await
    {
        Ok(_activated) => StatusCode::NO_CONTENT.into_response(),
        Err(err @ (ActivationError::EmailTaken | ActivationError::LinkExpired)) => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(ActivationError::Other(err)) => {
            error!("Failed to activate pending email change: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    fn config() -> Arc<AppConfig> {
        Arc::new(AppConfig::new(
            "https://custodia.dev".to_string(),
            SecretString::from("signing-secret".to_string()),
        ))
    }

    fn principal() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            session_hash: b"hash".to_vec(),
        }
    }

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn request_email_change_missing_payload() -> Result<()> {
        let response = request_email_change(
            Extension(principal()),
            Extension(lazy_pool()?),
            Extension(config()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn request_email_change_invalid_email() -> Result<()> {
        let response = request_email_change(
            Extension(principal()),
            Extension(lazy_pool()?),
            Extension(config()),
            Some(Json(EmailChangeRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_email_change_missing_params() -> Result<()> {
        let response = verify_email_change(
            None,
            Extension(lazy_pool()?),
            Extension(config()),
            Extension(Arc::new(EventBus::new())),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_email_change_bad_signature_skips_lookup() -> Result<()> {
        // The lazy pool would fail any query; a 400 here proves the
        // signature gate fires before database work.
        let response = verify_email_change(
            Some(Query(VerifyEmailChangeParams {
                token: "token".to_string(),
                expires: Utc::now().timestamp() + 3600,
                sig: "bogus".to_string(),
            })),
            Extension(lazy_pool()?),
            Extension(config()),
            Extension(Arc::new(EventBus::new())),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[test]
    fn pending_response_exposes_window_expiry() {
        let record = PendingEmailChange {
            id: Uuid::new_v4(),
            user_type: crate::email_change::USER_ENTITY_TYPE.to_string(),
            user_id: Uuid::new_v4(),
            email: "new@x.com".to_string(),
            token: "token".to_string(),
            created_at: Utc::now(),
        };
        let response = pending_response(&record, 60);
        assert_eq!(response.email, "new@x.com");
        assert_eq!(
            response.expires_at,
            record.expires_at(60).to_rfc3339()
        );
    }
}
