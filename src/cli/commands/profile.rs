//! Arguments for the self-service profile features: email changes, sudo
//! mode, passkeys, and the email outbox worker.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_URL_SIGNING_SECRET: &str = "url-signing-secret";
pub const ARG_PANEL_ID: &str = "panel-id";
pub const ARG_EMAIL_CHANGE_TTL_MINUTES: &str = "email-change-ttl-minutes";
pub const ARG_SUDO_ENABLED: &str = "sudo-enabled";
pub const ARG_SUDO_TTL_SECONDS: &str = "sudo-ttl-seconds";
pub const ARG_PRUNE_INTERVAL_SECONDS: &str = "prune-interval-seconds";
pub const ARG_PENDING_EMAIL_TABLE: &str = "pending-email-table";
pub const ARG_WEBAUTHN_TABLE: &str = "webauthn-table";
pub const ARG_WEBAUTHN_RP_ID: &str = "webauthn-rp-id";
pub const ARG_WEBAUTHN_RP_ORIGIN: &str = "webauthn-rp-origin";
pub const ARG_OUTBOX_POLL_SECONDS: &str = "email-outbox-poll-seconds";
pub const ARG_OUTBOX_BATCH_SIZE: &str = "email-outbox-batch-size";
pub const ARG_OUTBOX_MAX_ATTEMPTS: &str = "email-outbox-max-attempts";
pub const ARG_OUTBOX_BACKOFF_BASE_SECONDS: &str = "email-outbox-backoff-base-seconds";
pub const ARG_OUTBOX_BACKOFF_MAX_SECONDS: &str = "email-outbox-backoff-max-seconds";

#[derive(Debug)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub url_signing_secret: String,
    pub panel_id: String,
    pub email_change_ttl_minutes: i64,
    pub sudo_enabled: bool,
    pub sudo_ttl_seconds: i64,
    pub prune_interval_seconds: u64,
    pub pending_email_table: String,
    pub webauthn_table: String,
    pub webauthn_rp_id: Option<String>,
    pub webauthn_rp_origin: Option<String>,
    pub outbox: OutboxOptions,
}

impl Options {
    /// Read the profile options out of parsed matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            url_signing_secret: matches
                .get_one::<String>(ARG_URL_SIGNING_SECRET)
                .cloned()
                .context("missing required argument: --url-signing-secret")?,
            panel_id: matches
                .get_one::<String>(ARG_PANEL_ID)
                .cloned()
                .unwrap_or_else(|| "app".to_string()),
            email_change_ttl_minutes: matches
                .get_one::<i64>(ARG_EMAIL_CHANGE_TTL_MINUTES)
                .copied()
                .unwrap_or(60),
            sudo_enabled: matches
                .get_one::<bool>(ARG_SUDO_ENABLED)
                .copied()
                .unwrap_or(true),
            sudo_ttl_seconds: matches
                .get_one::<i64>(ARG_SUDO_TTL_SECONDS)
                .copied()
                .unwrap_or(7200),
            prune_interval_seconds: matches
                .get_one::<u64>(ARG_PRUNE_INTERVAL_SECONDS)
                .copied()
                .unwrap_or(900),
            pending_email_table: matches
                .get_one::<String>(ARG_PENDING_EMAIL_TABLE)
                .cloned()
                .unwrap_or_else(|| "pending_email_changes".to_string()),
            webauthn_table: matches
                .get_one::<String>(ARG_WEBAUTHN_TABLE)
                .cloned()
                .unwrap_or_else(|| "webauthn_keys".to_string()),
            webauthn_rp_id: matches.get_one::<String>(ARG_WEBAUTHN_RP_ID).cloned(),
            webauthn_rp_origin: matches.get_one::<String>(ARG_WEBAUTHN_RP_ORIGIN).cloned(),
            outbox: OutboxOptions {
                poll_seconds: matches
                    .get_one::<u64>(ARG_OUTBOX_POLL_SECONDS)
                    .copied()
                    .unwrap_or(5),
                batch_size: matches
                    .get_one::<usize>(ARG_OUTBOX_BATCH_SIZE)
                    .copied()
                    .unwrap_or(10),
                max_attempts: matches
                    .get_one::<u32>(ARG_OUTBOX_MAX_ATTEMPTS)
                    .copied()
                    .unwrap_or(5),
                backoff_base_seconds: matches
                    .get_one::<u64>(ARG_OUTBOX_BACKOFF_BASE_SECONDS)
                    .copied()
                    .unwrap_or(5),
                backoff_max_seconds: matches
                    .get_one::<u64>(ARG_OUTBOX_BACKOFF_MAX_SECONDS)
                    .copied()
                    .unwrap_or(300),
            },
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Base URL of the frontend that hosts the panel pages")
                .env("CUSTODIA_FRONTEND_BASE_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_URL_SIGNING_SECRET)
                .long(ARG_URL_SIGNING_SECRET)
                .help("Secret used to sign email verification links")
                .env("CUSTODIA_URL_SIGNING_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PANEL_ID)
                .long(ARG_PANEL_ID)
                .help("Panel identifier used to scope redirect and link paths")
                .env("CUSTODIA_PANEL_ID")
                .default_value("app"),
        )
        .arg(
            Arg::new(ARG_EMAIL_CHANGE_TTL_MINUTES)
                .long(ARG_EMAIL_CHANGE_TTL_MINUTES)
                .help("Minutes before a pending email change expires")
                .env("CUSTODIA_EMAIL_CHANGE_TTL_MINUTES")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SUDO_ENABLED)
                .long(ARG_SUDO_ENABLED)
                .help("Whether sensitive routes require sudo elevation")
                .env("CUSTODIA_SUDO_ENABLED")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_SUDO_TTL_SECONDS)
                .long(ARG_SUDO_TTL_SECONDS)
                .help("Seconds a sudo elevation stays active between guarded requests")
                .env("CUSTODIA_SUDO_TTL_SECONDS")
                .default_value("7200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_PRUNE_INTERVAL_SECONDS)
                .long(ARG_PRUNE_INTERVAL_SECONDS)
                .help("Seconds between prune sweeps over expired pending email changes")
                .env("CUSTODIA_PRUNE_INTERVAL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_PENDING_EMAIL_TABLE)
                .long(ARG_PENDING_EMAIL_TABLE)
                .help("Table name for pending email changes")
                .env("CUSTODIA_PENDING_EMAIL_TABLE")
                .default_value("pending_email_changes"),
        )
        .arg(
            Arg::new(ARG_WEBAUTHN_TABLE)
                .long(ARG_WEBAUTHN_TABLE)
                .help("Table name for WebAuthn keys")
                .env("CUSTODIA_WEBAUTHN_TABLE")
                .default_value("webauthn_keys"),
        )
        .arg(
            Arg::new(ARG_WEBAUTHN_RP_ID)
                .long(ARG_WEBAUTHN_RP_ID)
                .help("Relying-party id override (defaults to the frontend host)")
                .env("CUSTODIA_WEBAUTHN_RP_ID"),
        )
        .arg(
            Arg::new(ARG_WEBAUTHN_RP_ORIGIN)
                .long(ARG_WEBAUTHN_RP_ORIGIN)
                .help("Relying-party origin override (defaults to the frontend base URL)")
                .env("CUSTODIA_WEBAUTHN_RP_ORIGIN"),
        )
        .arg(
            Arg::new(ARG_OUTBOX_POLL_SECONDS)
                .long(ARG_OUTBOX_POLL_SECONDS)
                .help("Seconds between email outbox polls")
                .env("CUSTODIA_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BATCH_SIZE)
                .long(ARG_OUTBOX_BATCH_SIZE)
                .help("Messages locked per outbox batch")
                .env("CUSTODIA_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_MAX_ATTEMPTS)
                .long(ARG_OUTBOX_MAX_ATTEMPTS)
                .help("Delivery attempts before an outbox row is marked failed")
                .env("CUSTODIA_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BACKOFF_BASE_SECONDS)
                .long(ARG_OUTBOX_BACKOFF_BASE_SECONDS)
                .help("Base delay for outbox retry backoff")
                .env("CUSTODIA_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BACKOFF_MAX_SECONDS)
                .long(ARG_OUTBOX_BACKOFF_MAX_SECONDS)
                .help("Maximum delay for outbox retry backoff")
                .env("CUSTODIA_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}
