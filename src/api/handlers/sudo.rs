//! Sudo elevation endpoints.
//!
//! These handlers let an authenticated session enter sudo mode by
//! re-proving the account password, and inspect the current elevation.
//! The guard middleware consumes the elevation entry these endpoints
//! manage; a failed challenge explicitly clears it.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::auth::Principal;
use super::auth::password::verify_password;
use super::auth::storage::lookup_password_hash;
use crate::sudo::SudoGuard;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SudoStatusResponse {
    pub active: bool,
    pub expires_at: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SudoChallengeRequest {
    pub password: String,
}

/// Report whether the current session is elevated.
#[utoipa::path(
    get,
    path = "/v1/auth/sudo",
    responses(
        (status = 200, description = "Elevation status", body = SudoStatusResponse),
        (status = 401, description = "Missing or invalid session.")
    ),
    tag = "auth"
)]
pub async fn sudo_status(
    Extension(principal): Extension<Principal>,
    guard: Extension<Arc<SudoGuard>>,
) -> impl IntoResponse {
    let active = guard.store().is_active(&principal.session_hash).await;
    let expires_at = if active {
        guard
            .store()
            .expires_at(&principal.session_hash)
            .await
            .map(|at| at.to_rfc3339())
    } else {
        None
    };
    (
        StatusCode::OK,
        Json(SudoStatusResponse { active, expires_at }),
    )
}

/// Elevate the current session by re-proving the account password.
#[utoipa::path(
    post,
    path = "/v1/auth/sudo-challenge",
    request_body = SudoChallengeRequest,
    responses(
        (status = 204, description = "Session elevated"),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Missing session or wrong password.")
    ),
    tag = "auth"
)]
pub async fn sudo_challenge(
    Extension(principal): Extension<Principal>,
    pool: Extension<PgPool>,
    guard: Extension<Arc<SudoGuard>>,
    payload: Option<Json<SudoChallengeRequest>>,
) -> impl IntoResponse {
    let request: SudoChallengeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let stored_hash = match lookup_password_hash(&pool, principal.user_id).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to lookup password hash: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Passkey-only accounts have no password to prove; they cannot elevate
    // through this endpoint.
    let verified =
        stored_hash.is_some_and(|hash| verify_password(&request.password, &hash));

    if verified {
        guard.store().activate(&principal.session_hash).await;
        StatusCode::NO_CONTENT.into_response()
    } else {
        guard.store().deactivate(&principal.session_hash).await;
        StatusCode::UNAUTHORIZED.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::sudo::StaticSudoFlag;
    use anyhow::Result;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    fn guard() -> Arc<SudoGuard> {
        let config = super::super::auth::AppConfig::new(
            "https://custodia.dev".to_string(),
            SecretString::from("secret".to_string()),
        );
        Arc::new(SudoGuard::new(
            config,
            Arc::new(StaticSudoFlag::new(true)),
            Arc::new(EventBus::new()),
        ))
    }

    fn principal() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            session_hash: b"session-hash".to_vec(),
        }
    }

    #[tokio::test]
    async fn sudo_status_reports_inactive() -> Result<()> {
        let response = sudo_status(Extension(principal()), Extension(guard()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn sudo_status_reports_active_with_expiry() -> Result<()> {
        let guard = guard();
        guard.store().activate(b"session-hash").await;

        let response = sudo_status(Extension(principal()), Extension(guard))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn sudo_challenge_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = sudo_challenge(
            Extension(principal()),
            Extension(pool),
            Extension(guard()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn sudo_challenge_empty_password() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = sudo_challenge(
            Extension(principal()),
            Extension(pool),
            Extension(guard()),
            Some(Json(SudoChallengeRequest {
                password: String::new(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
