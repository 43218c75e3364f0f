use crate::{
    email_change::spawn_prune_worker,
    events::{EventBus, LogSubscriber},
    passkeys::PasskeyService,
    sudo::{StaticSudoFlag, SudoGuard, requires_sudo},
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::options,
};
use crate::api::handlers::auth::{AppConfig, middleware::require_session};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

// Keep these internal to the crate while allowing CLI/server wiring to reference them.
pub(crate) mod email;
pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use email::{EmailWorkerConfig, LogEmailSender, spawn_outbox_worker};
pub use openapi::openapi;

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    config: AppConfig,
    email_config: EmailWorkerConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let mut bus = EventBus::new();
    bus.subscribe(Arc::new(LogSubscriber));
    let events = Arc::new(bus);

    let guard = Arc::new(SudoGuard::new(
        config.clone(),
        Arc::new(StaticSudoFlag::new(config.sudo_enabled())),
        events.clone(),
    ));

    let passkeys = Arc::new(
        PasskeyService::new(
            pool.clone(),
            config.webauthn_rp_id(),
            config.webauthn_rp_origin(),
            config.webauthn_table().to_string(),
            events.clone(),
        )
        .context("Failed to build passkey service")?,
    );

    // Background workers: outbox delivery and pending-change pruning.
    email::spawn_outbox_worker(pool.clone(), Arc::new(email::LogEmailSender), email_config);
    spawn_prune_worker(
        pool.clone(),
        config.pending_email_table().to_string(),
        config.email_change_ttl_minutes(),
        Duration::from_secs(config.prune_interval_seconds()),
    );

    let frontend_origin = frontend_origin(config.frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    // Assemble the three route groups with their guards. Layers run
    // outside-in, so `require_session` is added last on guarded groups and
    // the sudo guard sees an already-resolved principal.
    let (public_routes, _openapi) = openapi::public_router().split_for_parts();
    let (session_routes, _openapi) = openapi::session_router().split_for_parts();
    let (sudo_routes, _openapi) = openapi::sudo_router().split_for_parts();

    let session_routes = session_routes.layer(axum::middleware::from_fn(require_session));
    let sudo_routes = sudo_routes
        .layer(axum::middleware::from_fn(requires_sudo))
        .layer(axum::middleware::from_fn(require_session));

    let app = public_routes
        .merge(session_routes)
        .merge(sudo_routes)
        .route("/health", options(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(Arc::new(config)))
                .layer(Extension(guard))
                .layer(Extension(events))
                .layer(Extension(passkeys))
                .layer(Extension(pool.clone())),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
