//! Passkey registration and two-factor bookkeeping.

pub mod models;
pub mod repo;
pub mod service;

pub use models::WebauthnKey;
pub use repo::WebauthnKeyRepo;
pub use service::{PasskeyRegistrationError, PasskeyService};
