//! Authenticated principal carried through request extensions.

use uuid::Uuid;

/// Authenticated user context derived from the session token.
///
/// Inserted into request extensions by [`super::middleware::require_session`];
/// guarded handlers read it back with the `Extension` extractor. The
/// session-token hash keys the sudo elevation entry, so elevation never
/// outlives the session it belongs to.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub session_hash: Vec<u8>,
}
