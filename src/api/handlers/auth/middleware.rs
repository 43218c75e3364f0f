//! Session-auth middleware for guarded routes.
//!
//! Resolves the session token once per request and stashes the resulting
//! [`Principal`] in request extensions so handlers (and the sudo guard
//! further in) never touch the token themselves.

use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;

use super::principal::Principal;
use super::session::authenticate_session;

pub async fn require_session(
    Extension(pool): Extension<PgPool>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate_session(request.headers(), &pool).await {
        Ok(Some(principal)) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Ok(None) => StatusCode::UNAUTHORIZED.into_response(),
        Err(status) => status.into_response(),
    }
}
