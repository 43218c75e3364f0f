use crate::api;
use crate::api::handlers::auth::AppConfig;
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub url_signing_secret: SecretString,
    pub panel_id: String,
    pub email_change_ttl_minutes: i64,
    pub sudo_enabled: bool,
    pub sudo_ttl_seconds: i64,
    pub prune_interval_seconds: u64,
    pub pending_email_table: String,
    pub webauthn_table: String,
    pub webauthn_rp_id: Option<String>,
    pub webauthn_rp_origin: Option<String>,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let mut config = AppConfig::new(args.frontend_base_url, args.url_signing_secret)
        .with_panel_id(args.panel_id)
        .with_email_change_ttl_minutes(args.email_change_ttl_minutes)
        .with_sudo_enabled(args.sudo_enabled)
        .with_sudo_ttl_seconds(args.sudo_ttl_seconds)
        .with_prune_interval_seconds(args.prune_interval_seconds)
        .with_pending_email_table(args.pending_email_table)
        .with_webauthn_table(args.webauthn_table);

    if let Some(rp_id) = args.webauthn_rp_id {
        config = config.with_webauthn_rp_id(rp_id);
    }
    if let Some(rp_origin) = args.webauthn_rp_origin {
        config = config.with_webauthn_rp_origin(rp_origin);
    }

    let email_config = api::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::new(args.port, args.dsn, config, email_config).await
}
