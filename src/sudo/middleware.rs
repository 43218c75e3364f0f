//! The sudo elevation guard.
//!
//! Sensitive routes are wrapped in [`requires_sudo`]. An elevated session
//! passes through and has its elevation window slid forward; anything else
//! is challenged: one `SudoModeChallenged` event, the stale entry cleared,
//! and a redirect to the panel's re-authentication page instead of the
//! handler.

use axum::{
    extract::{Extension, RawPathParams, Request},
    http::{StatusCode, header::LOCATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::api::handlers::auth::{AppConfig, Principal};
use crate::events::{DomainEvent, EventBus};
use crate::sudo::flag::SudoModeFlag;
use crate::sudo::store::SudoSessionStore;

/// Shared state for the guard: the elevation store, the feature flag, the
/// event bus, and the configuration that scopes the challenge redirect.
pub struct SudoGuard {
    store: SudoSessionStore,
    flag: Arc<dyn SudoModeFlag>,
    events: Arc<EventBus>,
    config: AppConfig,
}

impl SudoGuard {
    #[must_use]
    pub fn new(config: AppConfig, flag: Arc<dyn SudoModeFlag>, events: Arc<EventBus>) -> Self {
        Self {
            store: SudoSessionStore::new(config.sudo_ttl_seconds()),
            flag,
            events,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &SudoSessionStore {
        &self.store
    }

    /// Resolve the feature flag; resolution errors count as enabled.
    fn sudo_enforced(&self) -> bool {
        self.flag.enabled().unwrap_or(true)
    }
}

pub async fn requires_sudo(
    Extension(guard): Extension<Arc<SudoGuard>>,
    params: RawPathParams,
    request: Request,
    next: Next,
) -> Response {
    if !guard.sudo_enforced() {
        return next.run(request).await;
    }

    let Some(principal) = request.extensions().get::<Principal>().cloned() else {
        // The guard sits inside `require_session`; a missing principal means
        // the route was wired without it.
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if guard.store.is_active(&principal.session_hash).await {
        guard.store.extend(&principal.session_hash).await;
        return next.run(request).await;
    }

    guard.events.emit(&DomainEvent::SudoModeChallenged {
        user_id: principal.user_id,
        path: request.uri().path().to_string(),
    });
    guard.store.deactivate(&principal.session_hash).await;

    let tenant = params
        .iter()
        .find(|(name, _)| *name == "tenant")
        .map(|(_, value)| value.to_string());
    let location = guard.config.sudo_challenge_url(tenant.as_deref());
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result, anyhow};
    use axum::{Router, body::Body, http::Request as HttpRequest, routing::post};
    use secrecy::SecretString;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use uuid::Uuid;

    struct RecordedEvents(Mutex<Vec<DomainEvent>>);

    impl crate::events::EventSubscriber for RecordedEvents {
        fn handle(&self, event: &DomainEvent) {
            self.0.lock().expect("lock").push(event.clone());
        }
    }

    struct FailingFlag;

    impl SudoModeFlag for FailingFlag {
        fn enabled(&self) -> Result<bool> {
            Err(anyhow!("flag backend unavailable"))
        }
    }

    fn config() -> AppConfig {
        AppConfig::new(
            "https://custodia.dev".to_string(),
            SecretString::from("secret".to_string()),
        )
    }

    fn principal() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            session_hash: b"session-hash".to_vec(),
        }
    }

    struct Harness {
        guard: Arc<SudoGuard>,
        events: Arc<RecordedEvents>,
        calls: Arc<AtomicUsize>,
        app: Router,
    }

    fn harness_with(flag: Arc<dyn SudoModeFlag>, path: &str, principal: Principal) -> Harness {
        let events = Arc::new(RecordedEvents(Mutex::new(Vec::new())));
        let mut bus = EventBus::new();
        bus.subscribe(events.clone());
        let guard = Arc::new(SudoGuard::new(config(), flag, Arc::new(bus)));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let app = Router::new()
            .route(
                path,
                post(move || {
                    let seen = seen.clone();
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        StatusCode::NO_CONTENT
                    }
                }),
            )
            .layer(axum::middleware::from_fn(requires_sudo))
            .layer(Extension(guard.clone()))
            .layer(Extension(principal));

        Harness {
            guard,
            events,
            calls,
            app,
        }
    }

    fn harness(flag: Arc<dyn SudoModeFlag>) -> Harness {
        harness_with(flag, "/sensitive", principal())
    }

    async fn send(app: Router, uri: &str) -> Result<axum::response::Response> {
        app.oneshot(
            HttpRequest::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())?,
        )
        .await
        .map_err(|err| anyhow!("request failed: {err}"))
    }

    #[tokio::test]
    async fn inactive_elevation_challenges_and_redirects() -> Result<()> {
        let harness = harness(Arc::new(crate::sudo::flag::StaticSudoFlag::new(true)));

        let response = send(harness.app, "/sensitive").await?;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok()),
            Some("https://custodia.dev/app/sudo-challenge")
        );
        assert_eq!(harness.calls.load(Ordering::SeqCst), 0);

        let events = harness.events.0.lock().expect("lock");
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            DomainEvent::SudoModeChallenged { ref path, .. } if path == "/sensitive"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn active_elevation_passes_through_and_extends() -> Result<()> {
        let harness = harness(Arc::new(crate::sudo::flag::StaticSudoFlag::new(true)));
        let key = b"session-hash";
        harness
            .guard
            .store()
            .activate_at(key, chrono::Utc::now() - chrono::Duration::seconds(30))
            .await;
        let before = harness
            .guard
            .store()
            .expires_at(key)
            .await
            .context("entry")?;

        let response = send(harness.app, "/sensitive").await?;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
        assert!(harness.events.0.lock().expect("lock").is_empty());

        let after = harness
            .guard
            .store()
            .expires_at(key)
            .await
            .context("entry")?;
        assert!(after > before, "elevation expiry should slide forward");
        Ok(())
    }

    #[tokio::test]
    async fn disabled_flag_bypasses_the_guard() -> Result<()> {
        let harness = harness(Arc::new(crate::sudo::flag::StaticSudoFlag::new(false)));

        let response = send(harness.app, "/sensitive").await?;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
        assert!(harness.events.0.lock().expect("lock").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn flag_resolution_failure_counts_as_enabled() -> Result<()> {
        // A broken resolver must not switch the guard off: the request is
        // still challenged exactly once.
        let harness = harness(Arc::new(FailingFlag));

        let response = send(harness.app, "/sensitive").await?;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.events.0.lock().expect("lock").len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn challenge_clears_any_stale_entry() -> Result<()> {
        let harness = harness(Arc::new(crate::sudo::flag::StaticSudoFlag::new(true)));
        let key = b"session-hash";
        // Entry exists but is already past its expiry.
        harness
            .guard
            .store()
            .activate_at(key, chrono::Utc::now() - chrono::Duration::hours(3))
            .await;

        let response = send(harness.app, "/sensitive").await?;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(harness.guard.store().expires_at(key).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn tenant_route_parameter_reaches_the_redirect() -> Result<()> {
        let harness = harness_with(
            Arc::new(crate::sudo::flag::StaticSudoFlag::new(true)),
            "/t/{tenant}/sensitive",
            principal(),
        );

        let response = send(harness.app, "/t/acme/sensitive").await?;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok()),
            Some("https://custodia.dev/app/sudo-challenge?tenant=acme")
        );
        Ok(())
    }
}
