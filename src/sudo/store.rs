//! In-memory store for sudo elevation entries.
//!
//! An entry maps a session-token hash to its elevation expiry. Presence of
//! an unexpired entry is the sole source of truth for "elevation active";
//! there is no persisted row behind it, so elevation never survives a
//! process restart or the session itself.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

pub struct SudoSessionStore {
    ttl: Duration,
    entries: Mutex<HashMap<Vec<u8>, DateTime<Utc>>>,
}

impl SudoSessionStore {
    #[must_use]
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// True iff an entry exists for the key and has not expired.
    pub async fn is_active(&self, key: &[u8]) -> bool {
        self.is_active_at(key, Utc::now()).await
    }

    pub(crate) async fn is_active_at(&self, key: &[u8], now: DateTime<Utc>) -> bool {
        let entries = self.entries.lock().await;
        entries.get(key).is_some_and(|expires_at| now < *expires_at)
    }

    /// Create or refresh the elevation entry, restarting the full window.
    ///
    /// Expired entries for other sessions are dropped on the way, keeping
    /// the map bounded by the number of recently elevated sessions.
    pub async fn activate(&self, key: &[u8]) {
        self.activate_at(key, Utc::now()).await;
    }

    pub(crate) async fn activate_at(&self, key: &[u8], now: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, expires_at| now < *expires_at);
        entries.insert(key.to_vec(), now + self.ttl);
    }

    /// Sliding-window refresh used by the guard on every allowed request.
    pub async fn extend(&self, key: &[u8]) {
        self.activate(key).await;
    }

    /// Drop the entry, if any. Idempotent.
    pub async fn deactivate(&self, key: &[u8]) {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
    }

    pub async fn expires_at(&self, key: &[u8]) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().await;
        entries.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"session-hash";

    #[tokio::test]
    async fn absent_entry_is_inactive() {
        let store = SudoSessionStore::new(60);
        assert!(!store.is_active(KEY).await);
    }

    #[tokio::test]
    async fn activation_expires_after_ttl() {
        let store = SudoSessionStore::new(60);
        let t0 = Utc::now();
        store.activate_at(KEY, t0).await;

        assert!(store.is_active_at(KEY, t0).await);
        assert!(store.is_active_at(KEY, t0 + Duration::seconds(59)).await);
        assert!(!store.is_active_at(KEY, t0 + Duration::seconds(60)).await);
        assert!(!store.is_active_at(KEY, t0 + Duration::seconds(61)).await);
    }

    #[tokio::test]
    async fn extend_slides_the_window_forward() {
        let store = SudoSessionStore::new(60);
        let t0 = Utc::now();
        store.activate_at(KEY, t0).await;
        let first_expiry = store.expires_at(KEY).await.expect("entry");

        store.activate_at(KEY, t0 + Duration::seconds(30)).await;
        let second_expiry = store.expires_at(KEY).await.expect("entry");

        assert!(second_expiry > first_expiry);
        assert!(
            store
                .is_active_at(KEY, t0 + Duration::seconds(80))
                .await
        );
    }

    #[tokio::test]
    async fn deactivate_removes_the_entry() {
        let store = SudoSessionStore::new(60);
        store.activate(KEY).await;
        store.deactivate(KEY).await;
        assert!(!store.is_active(KEY).await);
        assert!(store.expires_at(KEY).await.is_none());

        // Deactivating again is a no-op.
        store.deactivate(KEY).await;
    }

    #[tokio::test]
    async fn stale_entries_are_pruned_on_activation() {
        let store = SudoSessionStore::new(60);
        let t0 = Utc::now();
        store.activate_at(b"other-session", t0).await;

        store.activate_at(KEY, t0 + Duration::seconds(120)).await;
        assert!(store.expires_at(b"other-session").await.is_none());
    }
}
