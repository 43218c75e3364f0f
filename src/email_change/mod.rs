//! Pending email change workflow: request, signed verification, activation,
//! and garbage collection.

pub mod models;
pub mod prune;
pub mod repo;
pub mod service;
pub(crate) mod signed_url;

pub use models::{PendingEmailChange, USER_ENTITY_TYPE, UserRef};
pub use prune::spawn_prune_worker;
pub use repo::PendingEmailRepo;
pub use service::{Activated, ActivationError, RequestOutcome, activate, request_change};
