//! Auto-Fetch Cache Module
//!
//! The user-facing cache: lookups that fetch on a miss and warm neighbors.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::cache::{BoundedCache, CacheEntry, CacheStats, Clock, EvictionPolicy, NO_EXPIRY};
use crate::config::Config;
use crate::error::Result;
use crate::fetch::{
    Direction, FetchCoordinator, FetchGate, FetchListener, FetchPool, Fetcher, NoopListener,
    Prefetcher,
};

// == Auto-Fetch Cache ==
/// A [`BoundedCache`] that fills itself from a [`Fetcher`].
///
/// Misses are fetched once per key no matter how many callers ask, and
/// [`get_with_neighbors`](Self::get_with_neighbors) warms the keys around
/// a request in the background.
pub struct AutoFetchCache<K, V> {
    coordinator: FetchCoordinator<K, V>,
    prefetcher: Prefetcher,
}

impl<K, V> AutoFetchCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Starts building a cache backed by `fetcher`.
    pub fn builder(fetcher: impl Fetcher<K, V>) -> AutoFetchCacheBuilder<K, V> {
        AutoFetchCacheBuilder::new(Arc::new(fetcher))
    }

    pub fn cache(&self) -> &Arc<BoundedCache<K, V>> {
        self.coordinator.cache()
    }

    pub fn prefetcher(&self) -> &Prefetcher {
        &self.prefetcher
    }

    // == Lookups ==
    /// Plain cache lookup. Never fetches.
    pub fn get(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
        self.cache().get(key)
    }

    /// Returns the entry for `key`, fetching it on a miss.
    pub async fn get_or_fetch(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
        self.coordinator.get_or_fetch(key).await
    }

    /// Looks up `key` and warms its neighbors in `ordered`.
    ///
    /// The requested key is registered before any neighbor, so it is never
    /// queued behind its own prefetches.
    pub async fn get_with_neighbors(&self, key: &K, ordered: &[K]) -> Option<Arc<CacheEntry<V>>> {
        let lookup = self.coordinator.begin(key);
        self.preload_neighbors(key, ordered);
        self.coordinator.finish(key, lookup).await
    }

    // == Preloading ==
    /// Dispatches background fetches for up to `count` neighbors of `key`.
    ///
    /// Returns the number of fetches started.
    pub fn preload(&self, key: &K, ordered: &[K], direction: Direction, count: usize) -> usize {
        self.prefetcher
            .preload(&self.coordinator, key, ordered, direction, count)
    }

    /// Preloads both directions with the configured counts.
    pub fn preload_neighbors(&self, key: &K, ordered: &[K]) -> usize {
        self.prefetcher
            .preload_neighbors(&self.coordinator, key, ordered)
    }

    // == Introspection ==
    pub fn is_fetching(&self, key: &K) -> bool {
        self.coordinator.is_fetching(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.coordinator.in_flight_count()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn hit_rate(&self) -> f64 {
        self.cache().hit_rate()
    }

    // == Shutdown ==
    /// Stops new fetches; running ones still land in the cache.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }

    /// Stops new fetches and aborts queued ones.
    pub fn shutdown_now(&self) {
        self.coordinator.shutdown_now();
    }
}

impl<K, V> fmt::Debug for AutoFetchCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoFetchCache")
            .field("coordinator", &self.coordinator)
            .field("prefetcher", &self.prefetcher)
            .finish()
    }
}

// == Builder ==
/// Configures an [`AutoFetchCache`].
pub struct AutoFetchCacheBuilder<K, V> {
    fetcher: Arc<dyn Fetcher<K, V>>,
    max_size: usize,
    valid_time_ms: i64,
    policy: Option<Arc<dyn EvictionPolicy<V>>>,
    clock: Option<Arc<dyn Clock>>,
    cache: Option<Arc<BoundedCache<K, V>>>,
    pool_size: usize,
    handle: Option<Handle>,
    prefetcher: Prefetcher,
    gate: FetchGate,
    listener: Arc<dyn FetchListener<K, V>>,
}

impl<K, V> AutoFetchCacheBuilder<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn new(fetcher: Arc<dyn Fetcher<K, V>>) -> Self {
        let defaults = Config::default();
        Self {
            fetcher,
            max_size: defaults.max_entries,
            valid_time_ms: NO_EXPIRY,
            policy: None,
            clock: None,
            cache: None,
            pool_size: defaults.pool_size,
            handle: None,
            prefetcher: Prefetcher::new(defaults.forward_count, defaults.backward_count),
            gate: Arc::new(|| true),
            listener: Arc::new(NoopListener),
        }
    }

    /// Applies capacity, expiry, pool and preload settings from `config`.
    pub fn with_config(self, config: &Config) -> Self {
        self.with_max_size(config.max_entries)
            .with_valid_time(config.valid_time_ms)
            .with_pool_size(config.pool_size)
            .with_forward_count(config.forward_count)
            .with_backward_count(config.backward_count)
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Time-to-live in milliseconds; zero or negative disables expiry.
    pub fn with_valid_time(mut self, valid_time_ms: i64) -> Self {
        self.valid_time_ms = valid_time_ms;
        self
    }

    pub fn with_policy(mut self, policy: impl EvictionPolicy<V> + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses an existing cache; capacity, expiry, policy and clock settings
    /// on this builder are then ignored.
    pub fn with_cache(mut self, cache: Arc<BoundedCache<K, V>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Runs fetch jobs on `handle` instead of the current runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_forward_count(mut self, count: usize) -> Self {
        self.prefetcher = Prefetcher::new(count, self.prefetcher.backward_count());
        self
    }

    pub fn with_backward_count(mut self, count: usize) -> Self {
        self.prefetcher = Prefetcher::new(self.prefetcher.forward_count(), count);
        self
    }

    /// Sets the predicate consulted before every new fetch.
    pub fn with_gate(mut self, gate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.gate = Arc::new(gate);
        self
    }

    pub fn with_listener(mut self, listener: impl FetchListener<K, V>) -> Self {
        self.listener = Arc::new(listener);
        self
    }

    /// Builds the cache.
    ///
    /// Fails on a zero capacity or pool size, or when no runtime handle was
    /// given and none is current.
    pub fn build(self) -> Result<AutoFetchCache<K, V>> {
        let cache = match self.cache {
            Some(cache) => cache,
            None => {
                let mut cache = BoundedCache::new(self.max_size)?.with_valid_time(self.valid_time_ms);
                if let Some(policy) = self.policy {
                    cache = cache.with_shared_policy(policy);
                }
                if let Some(clock) = self.clock {
                    cache = cache.with_clock(clock);
                }
                Arc::new(cache)
            }
        };

        let pool = match self.handle {
            Some(handle) => FetchPool::with_handle(self.pool_size, handle)?,
            None => FetchPool::new(self.pool_size)?,
        };

        Ok(AutoFetchCache {
            coordinator: FetchCoordinator::new(cache, self.fetcher, self.listener, pool, self.gate),
            prefetcher: self.prefetcher,
        })
    }
}
