//! Password verification for sudo re-authentication.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};

/// Verify a cleartext password against a stored PHC-format argon2 hash.
///
/// A malformed stored hash counts as a failed verification rather than an
/// error; the challenge endpoint treats both the same way.
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
