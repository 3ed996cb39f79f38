//! TTL Cleanup Task
//!
//! Background task that periodically removes invalid cache entries.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::BoundedCache;

/// Spawns a background task that periodically purges invalid cache entries.
///
/// Lookups already drop invalid entries lazily; the sweeper reclaims the
/// ones nobody asks for again. The task runs until aborted through the
/// returned handle.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(BoundedCache::<String, Vec<u8>>::new(64)?.with_valid_time(60_000));
/// let cleanup_handle = spawn_cleanup_task(Arc::clone(&cache), Duration::from_secs(30));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<K, V>(cache: Arc<BoundedCache<K, V>>, interval: Duration) -> JoinHandle<()>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting cache cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_invalid();
            if removed > 0 {
                info!(removed, "Cache cleanup: purged invalid entries");
            } else {
                debug!("Cache cleanup: no invalid entries found");
            }
        }
    })
}
