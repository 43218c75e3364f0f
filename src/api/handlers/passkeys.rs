//! Passkey endpoints for authenticated user self-service.
//!
//! Registration is a two-step ceremony: options binds a challenge to the
//! current user, finish verifies the authenticator response and stores the
//! credential with its two-factor bookkeeping. Both steps sit behind the
//! sudo guard.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use webauthn_rs::prelude::RegisterPublicKeyCredential;

use super::auth::{AppConfig, Principal};
use crate::email_change::UserRef;
use crate::passkeys::{PasskeyRegistrationError, PasskeyService, WebauthnKey, WebauthnKeyRepo};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasskeyRegisterOptionsResponse {
    pub reg_id: String,
    pub challenge: serde_json::Value,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct PasskeyRegisterFinishRequest {
    pub reg_id: String,
    pub label: String,
    pub attachment: Option<String>,
    pub response: serde_json::Value,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasskeySummary {
    pub id: String,
    pub credential_id: String,
    pub label: String,
    pub attachment: Option<String>,
    pub is_passkey: bool,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

fn summary(key: &WebauthnKey) -> PasskeySummary {
    PasskeySummary {
        id: key.id.to_string(),
        credential_id: base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&key.credential_id),
        label: key.label.clone(),
        attachment: key.attachment.clone(),
        is_passkey: key.is_passkey,
        created_at: key.created_at.to_rfc3339(),
        last_used_at: key.last_used_at.map(|at| at.to_rfc3339()),
    }
}

/// Generate passkey registration options for the current user.
#[utoipa::path(
    post,
    path = "/v1/me/passkeys/register/options",
    responses(
        (status = 200, description = "Passkey registration options", body = PasskeyRegisterOptionsResponse),
        (status = 401, description = "Missing or invalid session."),
        (status = 500, description = "Challenge generation failed")
    ),
    tag = "me"
)]
pub async fn register_options(
    Extension(principal): Extension<Principal>,
    service: Extension<Arc<PasskeyService>>,
) -> impl IntoResponse {
    match service
        .register_begin(principal.user_id, &principal.email)
        .await
    {
        Ok((challenge, reg_id)) => match serde_json::to_value(&challenge) {
            Ok(challenge) => (
                StatusCode::OK,
                Json(PasskeyRegisterOptionsResponse {
                    reg_id: reg_id.to_string(),
                    challenge,
                }),
            )
                .into_response(),
            Err(err) => {
                error!("Failed to serialize passkey challenge: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Err(err) => {
            error!("Failed to begin passkey registration: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Finish passkey registration and store the credential.
#[utoipa::path(
    post,
    path = "/v1/me/passkeys/register",
    request_body = PasskeyRegisterFinishRequest,
    responses(
        (status = 201, description = "Passkey registered", body = PasskeySummary),
        (status = 400, description = "Invalid registration payload or ceremony failure", body = String),
        (status = 401, description = "Missing or invalid session.")
    ),
    tag = "me"
)]
pub async fn register_finish(
    Extension(principal): Extension<Principal>,
    service: Extension<Arc<PasskeyService>>,
    payload: Option<Json<PasskeyRegisterFinishRequest>>,
) -> impl IntoResponse {
    let request: PasskeyRegisterFinishRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let Ok(reg_id) = Uuid::parse_str(request.reg_id.trim()) else {
        return (StatusCode::BAD_REQUEST, "Invalid reg id".to_string()).into_response();
    };

    let label = request.label.trim();
    if label.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing passkey label".to_string()).into_response();
    }

    let Ok(reg_response) =
        serde_json::from_value::<RegisterPublicKeyCredential>(request.response)
    else {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid passkey response".to_string(),
        )
            .into_response();
    };

    match service
        .register_finish(
            reg_id,
            principal.user_id,
            &reg_response,
            label,
            request.attachment.as_deref(),
        )
        .await
    {
        Ok(key) => {
            info!(user_id = %principal.user_id, "passkey registered");
            (StatusCode::CREATED, Json(summary(&key))).into_response()
        }
        Err(
            err @ (PasskeyRegistrationError::SessionNotFound
            | PasskeyRegistrationError::Verification(_)),
        ) => {
            warn!(user_id = %principal.user_id, "passkey registration rejected: {err}");
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(PasskeyRegistrationError::Other(err)) => {
            error!("Failed to store passkey: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// List the current user's WebAuthn keys.
#[utoipa::path(
    get,
    path = "/v1/me/passkeys",
    responses(
        (status = 200, description = "Registered keys", body = [PasskeySummary]),
        (status = 401, description = "Missing or invalid session.")
    ),
    tag = "me"
)]
pub async fn list_passkeys(
    Extension(principal): Extension<Principal>,
    pool: Extension<PgPool>,
    config: Extension<Arc<AppConfig>>,
) -> impl IntoResponse {
    let user = UserRef::user(principal.user_id);
    match WebauthnKeyRepo::list_user_keys(&pool, config.webauthn_table(), &user).await {
        Ok(keys) => {
            let response: Vec<PasskeySummary> = keys.iter().map(summary).collect();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!("Failed to list webauthn keys: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use anyhow::Result;
    use axum::response::IntoResponse;
    use chrono::Utc;
    use sqlx::postgres::PgPoolOptions;

    fn service() -> Result<Arc<PasskeyService>> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        Ok(Arc::new(PasskeyService::new(
            pool,
            "custodia.dev",
            "https://custodia.dev",
            "webauthn_keys".to_string(),
            Arc::new(EventBus::new()),
        )?))
    }

    fn principal() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            session_hash: b"hash".to_vec(),
        }
    }

    #[tokio::test]
    async fn register_finish_missing_payload() -> Result<()> {
        let response = register_finish(Extension(principal()), Extension(service()?), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_finish_rejects_bad_reg_id() -> Result<()> {
        let response = register_finish(
            Extension(principal()),
            Extension(service()?),
            Some(Json(PasskeyRegisterFinishRequest {
                reg_id: "not-a-uuid".to_string(),
                label: "YubiKey".to_string(),
                attachment: None,
                response: serde_json::json!({}),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_finish_rejects_blank_label() -> Result<()> {
        let response = register_finish(
            Extension(principal()),
            Extension(service()?),
            Some(Json(PasskeyRegisterFinishRequest {
                reg_id: Uuid::new_v4().to_string(),
                label: "  ".to_string(),
                attachment: None,
                response: serde_json::json!({}),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[test]
    fn summary_encodes_credential_id() {
        let key = WebauthnKey {
            id: Uuid::new_v4(),
            user_type: crate::email_change::USER_ENTITY_TYPE.to_string(),
            user_id: Uuid::new_v4(),
            credential_id: vec![1, 2, 3, 4],
            label: "YubiKey".to_string(),
            passkey_data: Vec::new(),
            attachment: Some("cross-platform".to_string()),
            is_passkey: true,
            created_at: Utc::now(),
            last_used_at: None,
        };
        let summary = summary(&key);
        assert_eq!(summary.credential_id, "AQIDBA");
        assert!(summary.is_passkey);
        assert_eq!(summary.attachment.as_deref(), Some("cross-platform"));
    }
}
