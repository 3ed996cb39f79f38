//! Autofetch Cache demo
//!
//! Resolves files below a directory through an auto-fetch cache, warming the
//! neighbors of each requested key, and prints the cache statistics.
//!
//! Usage: `autofetch_cache <dir> <key>...`

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autofetch_cache::cache::CacheEntry;
use autofetch_cache::fetch::{AutoFetchCache, FetchListener, FileFetcher};
use autofetch_cache::{spawn_cleanup_task, Config, FailureKind, FetchError};

/// Logs how each lookup resolved.
struct LoggingListener;

impl FetchListener<String, Vec<u8>> for LoggingListener {
    fn on_success(&self, key: &String, entry: &Arc<CacheEntry<Vec<u8>>>, was_cached: bool) {
        info!(key = %key, bytes = entry.data().len(), was_cached, "Resolved");
    }

    fn on_failure(&self, key: &String, kind: FailureKind, cause: &FetchError) {
        warn!(key = %key, ?kind, error = %cause, "Fetch failed");
    }
}

/// Main entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the auto-fetch cache over the given directory
/// 4. Start the background cleanup task if configured
/// 5. Resolve every key with neighbor preloading
/// 6. Print statistics and shut the fetch pool down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autofetch_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(dir) = args.next() else {
        bail!("usage: autofetch_cache <dir> <key>...");
    };
    let keys: Vec<String> = args.collect();

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, valid_time_ms={}, pool_size={}, preload={}/{}",
        config.max_entries,
        config.valid_time_ms,
        config.pool_size,
        config.forward_count,
        config.backward_count
    );

    let fetcher = FileFetcher::new(&dir);
    let cache = AutoFetchCache::builder(fetcher)
        .with_config(&config)
        // Evict the largest buffer first
        .with_policy(|a: &CacheEntry<Vec<u8>>, b: &CacheEntry<Vec<u8>>| {
            b.data().len().cmp(&a.data().len())
        })
        .with_listener(LoggingListener)
        .build()
        .context("failed to build cache")?;

    let cleanup_handle = config
        .cleanup_period()
        .map(|period| spawn_cleanup_task(Arc::clone(cache.cache()), period));

    for key in &keys {
        match cache.get_with_neighbors(key, &keys).await {
            Some(entry) => println!("{}: {} bytes", key, entry.data().len()),
            None => println!("{}: <missing>", key),
        }
    }

    cache.shutdown();
    if let Some(handle) = cleanup_handle {
        handle.abort();
    }

    let stats = serde_json::to_string_pretty(&cache.stats()).context("failed to encode stats")?;
    println!("{}", stats);
    Ok(())
}
