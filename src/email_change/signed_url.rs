//! Signed, time-limited verification links.
//!
//! The link embeds the pending record's token, an expiry timestamp, and an
//! HMAC-SHA256 signature over both. Tampering with either query parameter
//! invalidates the signature; the expiry is enforced here as well, so a
//! stale link is rejected before any database work happens.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Build the panel-scoped verification URL for a pending email change.
pub(crate) fn signed_verification_url(
    frontend_base_url: &str,
    panel_id: &str,
    token: &str,
    expires_at: DateTime<Utc>,
    secret: &[u8],
) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    let expires = expires_at.timestamp();
    let sig = compute_signature(secret, token, expires);
    format!("{base}/{panel_id}/pending-email/verify?token={token}&expires={expires}&sig={sig}")
}

/// Validate a presented link: signature first, then expiry.
pub(crate) fn verify_signed_link(
    token: &str,
    expires: i64,
    sig: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> bool {
    let expected = compute_signature(secret, token, expires);
    if !constant_time_eq(sig.as_bytes(), expected.as_bytes()) {
        return false;
    }
    now.timestamp() <= expires
}

fn compute_signature(secret: &[u8], token: &str, expires: i64) -> String {
    // HMAC keys accept any length.
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(token.as_bytes());
    mac.update(b":");
    mac.update(expires.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
