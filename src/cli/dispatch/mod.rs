//! Command-line argument dispatch and server initialization.
//!
//! This module takes validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::profile;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let profile_opts = profile::Options::parse(matches)?;

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        frontend_base_url: profile_opts.frontend_base_url,
        url_signing_secret: SecretString::from(profile_opts.url_signing_secret),
        panel_id: profile_opts.panel_id,
        email_change_ttl_minutes: profile_opts.email_change_ttl_minutes,
        sudo_enabled: profile_opts.sudo_enabled,
        sudo_ttl_seconds: profile_opts.sudo_ttl_seconds,
        prune_interval_seconds: profile_opts.prune_interval_seconds,
        pending_email_table: profile_opts.pending_email_table,
        webauthn_table: profile_opts.webauthn_table,
        webauthn_rp_id: profile_opts.webauthn_rp_id,
        webauthn_rp_origin: profile_opts.webauthn_rp_origin,
        email_outbox_poll_seconds: profile_opts.outbox.poll_seconds,
        email_outbox_batch_size: profile_opts.outbox.batch_size,
        email_outbox_max_attempts: profile_opts.outbox.max_attempts,
        email_outbox_backoff_base_seconds: profile_opts.outbox.backoff_base_seconds,
        email_outbox_backoff_max_seconds: profile_opts.outbox.backoff_max_seconds,
    })))
}
