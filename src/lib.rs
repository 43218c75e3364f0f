//! # Custodia (Account Security Self-Service)
//!
//! `custodia` is the account-security self-service API. It lets an
//! authenticated user change their email address through a verified,
//! token-based workflow, register passkeys as second factors, and gates
//! both behind a time-boxed "sudo mode" elevation.
//!
//! ## Email changes
//!
//! An email change never takes effect immediately. The requested address is
//! stored as a pending record with an opaque token, and a signed,
//! time-limited verification link is mailed to the candidate address.
//! Activation re-validates everything at click time (address still free,
//! link still fresh), archives the previous address for a later revert, and
//! removes every pending record that targeted the same candidate address so
//! a stale token can never be redeemed against a reassigned email.
//!
//! ## Sudo mode
//!
//! Sensitive routes are wrapped in an elevation guard. A session becomes
//! elevated by re-proving the account password; the elevation entry lives in
//! memory, keyed by the session-token hash, and slides forward on every
//! guarded request. Requests without an active elevation are redirected to
//! the panel's re-authentication page instead of reaching the handler.
//!
//! ## Passkeys
//!
//! Passkey registration runs the `WebAuthn` ceremony via `webauthn-rs` and
//! records the credential with its two-factor bookkeeping: the per-user
//! "has passkeys" cache is invalidated and the account is marked
//! two-factor enabled only after the credential is durably stored.

pub mod api;
pub mod cli;
pub mod email_change;
pub mod events;
pub mod passkeys;
pub mod sudo;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
