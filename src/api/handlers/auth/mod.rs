//! Session auth, configuration, and the shared request principal.

pub mod middleware;
pub(crate) mod password;
pub mod principal;
pub(crate) mod session;
pub mod state;
pub(crate) mod storage;
pub(crate) mod utils;

pub use principal::Principal;
pub use state::AppConfig;
