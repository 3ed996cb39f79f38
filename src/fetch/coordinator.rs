//! Fetch Coordinator Module
//!
//! Single-flight fetching on top of a [`BoundedCache`].
//!
//! At most one fetch runs per key. Callers that miss while a fetch for the
//! same key is running wait for it instead of starting their own, and every
//! waiter observes the same outcome.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{BoundedCache, CacheEntry};
use crate::error::FetchError;
use crate::fetch::{FetchListener, FetchPool, Fetcher};

/// Predicate consulted before starting a new fetch.
pub type FetchGate = Arc<dyn Fn() -> bool + Send + Sync>;

// == Fetch Handle ==
/// Completion signal for one in-flight fetch.
#[derive(Debug, Clone)]
pub(crate) struct FetchHandle {
    done: watch::Receiver<bool>,
}

impl FetchHandle {
    /// Waits until the fetch resolves. A dropped sender counts as resolved.
    async fn wait(mut self) {
        let _ = self.done.wait_for(|done| *done).await;
    }
}

struct Shared<K, V> {
    cache: Arc<BoundedCache<K, V>>,
    fetcher: Arc<dyn Fetcher<K, V>>,
    listener: Arc<dyn FetchListener<K, V>>,
    inflight: Mutex<HashMap<K, FetchHandle>>,
}

// == Inflight Guard ==
/// Owns a key's in-flight registration.
///
/// Dropping the guard unregisters the key and wakes waiters, so a failed,
/// panicked or aborted fetch can never leave the key stuck.
struct InflightGuard<K: Eq + Hash, V> {
    key: K,
    shared: Arc<Shared<K, V>>,
    done: watch::Sender<bool>,
}

impl<K: Eq + Hash, V> Drop for InflightGuard<K, V> {
    fn drop(&mut self) {
        // Unregister before waking so a woken waiter never sees its key in flight.
        self.shared.inflight.lock().remove(&self.key);
        self.done.send_replace(true);
    }
}

pub(crate) enum Registration {
    /// A new fetch was started for the key
    Started(FetchHandle),
    /// Another fetch for the key was already running
    Joined(FetchHandle),
    /// The key became valid in the cache before a fetch was needed
    Cached,
    /// Fetching is not allowed right now
    Declined,
}

/// Who asked for a fetch; decides how its result is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// A caller missed and waits for the value
    Lookup,
    /// A background preload; never replaces a valid entry
    Preload,
}

/// First half of a lookup: either a hit or a pending registration.
pub(crate) enum Lookup<V> {
    Hit(Arc<CacheEntry<V>>),
    Pending(Registration),
}

// == Fetch Coordinator ==
pub struct FetchCoordinator<K, V> {
    shared: Arc<Shared<K, V>>,
    pool: FetchPool,
    gate: FetchGate,
}

impl<K, V> FetchCoordinator<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // == Constructor ==
    pub fn new(
        cache: Arc<BoundedCache<K, V>>,
        fetcher: Arc<dyn Fetcher<K, V>>,
        listener: Arc<dyn FetchListener<K, V>>,
        pool: FetchPool,
        gate: FetchGate,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                cache,
                fetcher,
                listener,
                inflight: Mutex::new(HashMap::new()),
            }),
            pool,
            gate,
        }
    }

    pub fn cache(&self) -> &Arc<BoundedCache<K, V>> {
        &self.shared.cache
    }

    pub fn pool(&self) -> &FetchPool {
        &self.pool
    }

    // == Get Or Fetch ==
    /// Returns the cached entry, fetching it first if it is missing.
    ///
    /// Suspends until this caller's fetch, or the one it joined, resolves.
    /// Fetch failures surface as `None`; details go to the listener.
    pub async fn get_or_fetch(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
        let lookup = self.begin(key);
        self.finish(key, lookup).await
    }

    /// Looks `key` up and, on a miss, registers or joins a fetch without waiting.
    pub(crate) fn begin(&self, key: &K) -> Lookup<V> {
        match self.shared.cache.get(key) {
            Some(entry) => Lookup::Hit(entry),
            None => Lookup::Pending(self.register(key, Origin::Lookup)),
        }
    }

    /// Completes a lookup started by [`begin`](Self::begin).
    ///
    /// The initial miss is already on the books. A caller that started the
    /// fetch keeps that miss; a caller served by someone else's fetch has it
    /// re-booked as a hit. The re-read itself is never counted.
    pub(crate) async fn finish(&self, key: &K, lookup: Lookup<V>) -> Option<Arc<CacheEntry<V>>> {
        match lookup {
            Lookup::Hit(entry) => {
                self.shared.listener.on_success(key, &entry, true);
                Some(entry)
            }
            Lookup::Pending(Registration::Started(handle)) => {
                handle.wait().await;
                self.shared.cache.get_quiet(key)
            }
            Lookup::Pending(Registration::Joined(handle)) => {
                handle.wait().await;
                self.coordinated_read(key)
            }
            Lookup::Pending(Registration::Cached) => {
                let entry = self.coordinated_read(key)?;
                self.shared.listener.on_success(key, &entry, true);
                Some(entry)
            }
            Lookup::Pending(Registration::Declined) => None,
        }
    }

    fn coordinated_read(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
        let entry = self.shared.cache.get_quiet(key)?;
        self.shared.cache.convert_miss_to_hit();
        Some(entry)
    }

    // == Dispatch ==
    /// Starts a background fetch for `key` without waiting for it.
    ///
    /// Returns false if the key is cached, already in flight, or fetching
    /// is currently not allowed. The fetched value never replaces an entry
    /// that became valid while it ran.
    pub fn dispatch(&self, key: &K) -> bool {
        matches!(self.register(key, Origin::Preload), Registration::Started(_))
    }

    fn existing(&self, inflight: &HashMap<K, FetchHandle>, key: &K) -> Option<Registration> {
        if let Some(handle) = inflight.get(key) {
            return Some(Registration::Joined(handle.clone()));
        }
        if self.shared.cache.contains_key(key) {
            return Some(Registration::Cached);
        }
        None
    }

    fn register(&self, key: &K, origin: Origin) -> Registration {
        if let Some(existing) = self.existing(&self.shared.inflight.lock(), key) {
            return existing;
        }
        // The gate is user code; it runs without the registry lock held.
        if !(self.gate)() {
            debug!("Fetch declined by gate");
            return Registration::Declined;
        }

        let (handle, guard) = {
            let mut inflight = self.shared.inflight.lock();
            if let Some(existing) = self.existing(&inflight, key) {
                return existing;
            }

            let (done, receiver) = watch::channel(false);
            let handle = FetchHandle { done: receiver };
            inflight.insert(key.clone(), handle.clone());
            let guard = InflightGuard {
                key: key.clone(),
                shared: Arc::clone(&self.shared),
                done,
            };
            (handle, guard)
        };

        // Spawned outside the registry lock: a refused job drops its guard,
        // and the guard's drop takes that lock.
        if !self.pool.spawn(run_fetch(guard, origin)) {
            debug!("Fetch pool refused job");
            return Registration::Declined;
        }
        Registration::Started(handle)
    }

    // == Introspection ==
    /// Returns true while a fetch for `key` is running or queued.
    pub fn is_fetching(&self, key: &K) -> bool {
        self.shared.inflight.lock().contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.inflight.lock().len()
    }

    // == Shutdown ==
    /// Stops starting new fetches; running ones complete normally.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Stops starting new fetches and aborts pending ones. Waiters see `None`.
    pub fn shutdown_now(&self) {
        self.pool.shutdown_now();
    }
}

impl<K, V> fmt::Debug for FetchCoordinator<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("cache", &self.shared.cache)
            .field("in_flight", &self.shared.inflight.lock().len())
            .field("pool", &self.pool)
            .finish()
    }
}

// == Fetch Job ==
async fn run_fetch<K, V>(guard: InflightGuard<K, V>, origin: Origin)
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let shared = Arc::clone(&guard.shared);
    let key = guard.key.clone();

    let fetcher = Arc::clone(&shared.fetcher);
    let fetch_key = key.clone();
    let outcome = match tokio::task::spawn_blocking(move || fetcher.fetch(&fetch_key)).await {
        Ok(result) => result,
        Err(err) => Err(FetchError::Worker(err.to_string())),
    };

    let stored = match outcome {
        Ok(Some(value)) => match origin {
            Origin::Lookup => shared.cache.put(key.clone(), value).map(|entry| (entry, false)),
            Origin::Preload => shared
                .cache
                .put_if_absent(key.clone(), value)
                .map(|(entry, fresh)| (entry, !fresh)),
        }
        .ok_or(FetchError::Refused),
        Ok(None) => Err(FetchError::Empty),
        Err(err) => Err(err),
    };

    // Wake waiters before running callbacks.
    drop(guard);

    match stored {
        Ok((entry, was_cached)) => shared.listener.on_success(&key, &entry, was_cached),
        Err(err) => {
            match &err {
                FetchError::Empty => debug!("Fetcher returned no data"),
                other => warn!(error = %other, kind = ?other.kind(), "Fetch failed"),
            }
            shared.listener.on_failure(&key, err.kind(), &err);
        }
    }
}
