pub mod auth;
pub mod email_change;
pub mod health;
pub mod passkeys;
pub mod sudo;
