//! Background Purge Task
//!
//! Periodically removes expired, version-stale and corrupt entries from a store.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::cache::Store;

/// Spawns a task running [`Store::purge_expired_entries`] every
/// `interval_secs` seconds (minimum one).
///
/// A failed purge is logged and retried on the next tick. Abort the returned
/// handle to stop the task.
///
/// # Example
/// ```ignore
/// let store = Arc::new(Store::new(MemoryBackend::new(), Ttl::Millis(5_000), None));
/// let purge_handle = spawn_purge_task(store.clone(), 60);
/// // Later, during shutdown:
/// purge_handle.abort();
/// ```
pub fn spawn_purge_task<T, B>(store: Arc<Store<T, B>>, interval_secs: u64) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    B: Backend<T>,
{
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting purge task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match store.purge_expired_entries().await {
                Ok(0) => debug!("Purge: no invalid entries found"),
                Ok(removed) => info!("Purge: removed {} invalid entries", removed),
                Err(e) => warn!(error = %e, "Purge failed"),
            }
        }
    })
}
