//! Background garbage collection for expired pending email changes.

use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error};

use super::repo::PendingEmailRepo;

/// Spawn the prune loop: delete records past the expiry window on a fixed
/// cadence. Activation does not depend on this; pruning only keeps the
/// table from accumulating dead rows.
pub fn spawn_prune_worker(
    pool: PgPool,
    table: String,
    window_minutes: i64,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match PendingEmailRepo::prune_expired(&pool, &table, window_minutes).await {
                Ok(0) => {}
                Ok(deleted) => debug!(deleted, "pruned expired pending email changes"),
                Err(err) => error!("pending email change prune failed: {err}"),
            }
            sleep(interval).await;
        }
    })
}
