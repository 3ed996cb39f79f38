//! Cache Store Module
//!
//! Bounded cache engine combining an insertion-ordered map with pluggable
//! eviction, TTL expiry and hit/miss accounting.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::cache::policy::select_victim;
use crate::cache::{CacheEntry, CacheStats, Clock, EnterTimeFirst, EvictionPolicy, SystemClock};
use crate::error::{CacheError, Result};
use crate::persist::Persistence;

/// Valid time meaning "entries never expire by age".
pub const NO_EXPIRY: i64 = -1;

// == Bounded Cache ==
/// Concurrent key → entry store with a fixed capacity.
///
/// Lookups share a read lock and update per-entry usage through atomics.
/// Every insertion takes the write lock, so victim selection and insert
/// happen as one step and the size never exceeds `max_size`.
pub struct BoundedCache<K, V> {
    /// Entries in insertion order; ties during eviction go to the oldest slot
    entries: RwLock<IndexMap<K, Arc<CacheEntry<V>>>>,
    /// Performance statistics
    stats: Mutex<CacheStats>,
    /// Maximum number of entries allowed
    max_size: usize,
    /// Time-to-live in milliseconds, <= 0 disables age-based expiry
    valid_time_ms: i64,
    /// Victim ordering used when the cache is full
    policy: Arc<dyn EvictionPolicy<V>>,
    /// Time source for stamps and expiry checks
    clock: Arc<dyn Clock>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash,
{
    // == Constructor ==
    /// Creates an empty cache holding at most `max_size` entries.
    ///
    /// Defaults to no expiry, oldest-first eviction and the system clock.
    pub fn new(max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(CacheError::InvalidArgument(
                "max_size must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            entries: RwLock::new(IndexMap::with_capacity(max_size)),
            stats: Mutex::new(CacheStats::new()),
            max_size,
            valid_time_ms: NO_EXPIRY,
            policy: Arc::new(EnterTimeFirst),
            clock: Arc::new(SystemClock),
        })
    }

    /// Sets the time-to-live applied to every entry.
    pub fn with_valid_time(mut self, valid_time_ms: i64) -> Self {
        self.valid_time_ms = valid_time_ms;
        self
    }

    /// Sets the eviction policy.
    pub fn with_policy(self, policy: impl EvictionPolicy<V> + 'static) -> Self {
        self.with_shared_policy(Arc::new(policy))
    }

    pub fn with_shared_policy(mut self, policy: Arc<dyn EvictionPolicy<V>>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // == Accessors ==
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn valid_time_ms(&self) -> i64 {
        self.valid_time_ms
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Get ==
    /// Retrieves a valid entry and records a hit, or records a miss.
    ///
    /// An invalid entry found on the way is removed.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<CacheEntry<V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let found = self.lookup(key);
        let mut stats = self.stats.lock();
        match found {
            Some(_) => stats.record_hit(),
            None => stats.record_miss(),
        }
        found
    }

    /// Same as [`get`](Self::get) without touching the hit/miss counters.
    pub(crate) fn get_quiet<Q>(&self, key: &Q) -> Option<Arc<CacheEntry<V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.lookup(key)
    }

    fn lookup<Q>(&self, key: &Q) -> Option<Arc<CacheEntry<V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let now = self.now_ms();
        let entry = self.entries.read().get(key).cloned()?;

        if entry.is_valid(self.valid_time_ms, now) {
            entry.touch(now);
            return Some(entry);
        }

        // Only drop the entry we inspected; a concurrent put may have replaced it.
        let mut entries = self.entries.write();
        if entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &entry))
        {
            entries.shift_remove(key);
            let remaining = entries.len();
            drop(entries);

            let mut stats = self.stats.lock();
            stats.record_purged(1);
            stats.set_total_entries(remaining);
        }
        None
    }

    // == Put ==
    /// Stores `value` under `key`, stamping a fresh entry.
    ///
    /// The entry is marked forever-valid when the cache has no valid time.
    /// Returns `None` if the cache is full and the policy refuses eviction.
    pub fn put(&self, key: K, value: V) -> Option<Arc<CacheEntry<V>>> {
        let entry = CacheEntry::new(value).with_forever(self.valid_time_ms <= 0);
        self.put_entry(key, entry)
    }

    /// Stores a prepared entry, keeping its priority and flags.
    pub fn put_entry(&self, key: K, mut entry: CacheEntry<V>) -> Option<Arc<CacheEntry<V>>> {
        entry.stamp(self.now_ms());
        self.insert(key, entry)
    }

    /// Inserts an entry as-is, without restamping its enter time.
    pub(crate) fn restore(&self, key: K, entry: CacheEntry<V>) -> Option<Arc<CacheEntry<V>>> {
        self.insert(key, entry)
    }

    /// Stores `value` unless a valid entry already holds `key`.
    ///
    /// Returns the entry now under `key` and whether it is the one just
    /// stored, or `None` if the cache is full and refuses eviction.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<(Arc<CacheEntry<V>>, bool)> {
        let mut entry = CacheEntry::new(value).with_forever(self.valid_time_ms <= 0);
        entry.stamp(self.now_ms());
        self.insert_with(key, entry, false)
    }

    fn insert(&self, key: K, entry: CacheEntry<V>) -> Option<Arc<CacheEntry<V>>> {
        self.insert_with(key, entry, true).map(|(entry, _)| entry)
    }

    fn insert_with(
        &self,
        key: K,
        entry: CacheEntry<V>,
        replace: bool,
    ) -> Option<(Arc<CacheEntry<V>>, bool)> {
        let mut entries = self.entries.write();

        if !replace {
            let now = self.now_ms();
            if let Some(existing) = entries
                .get(&key)
                .filter(|existing| existing.is_valid(self.valid_time_ms, now))
            {
                return Some((Arc::clone(existing), false));
            }
        }

        // Overwriting an existing key never needs room.
        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            let purged = self.purge_locked(&mut entries);
            if purged > 0 {
                debug!(purged, "Purged invalid entries to make room");
                self.stats.lock().record_purged(purged);
            }

            if entries.len() >= self.max_size {
                if !self.policy.allows_eviction() {
                    debug!(size = entries.len(), "Cache full and policy forbids eviction");
                    return None;
                }

                let victim =
                    select_victim(self.policy.as_ref(), entries.values().map(Arc::as_ref))?;
                entries.shift_remove_index(victim)?;
                self.stats.lock().record_eviction();
                debug!(index = victim, "Evicted entry to make room");
            }
        }

        let entry = Arc::new(entry);
        // Re-inserted keys move to the back so iteration order tracks insertion.
        entries.shift_remove(&key);
        entries.insert(key, Arc::clone(&entry));
        let total = entries.len();
        drop(entries);

        self.stats.lock().set_total_entries(total);
        Some((entry, true))
    }

    // == Put All ==
    /// Copies every live entry of `other` into this cache.
    ///
    /// Each copy is an independent `put`; refused inserts are skipped.
    /// Returns the number of entries stored.
    pub fn put_all(&self, other: &BoundedCache<K, V>) -> usize
    where
        K: Clone,
        V: Clone,
    {
        other
            .entries()
            .into_iter()
            .filter_map(|(key, entry)| self.put_entry(key, CacheEntry::clone(&entry)))
            .count()
    }

    // == Contains ==
    /// Returns true if `key` is present and still valid.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let now = self.now_ms();
        self.entries
            .read()
            .get(key)
            .is_some_and(|entry| entry.is_valid(self.valid_time_ms, now))
    }

    // == Remove ==
    /// Removes an entry regardless of validity. Statistics are untouched.
    pub fn remove<Q>(&self, key: &Q) -> Option<Arc<CacheEntry<V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let mut entries = self.entries.write();
        let removed = entries.shift_remove(key);
        let total = entries.len();
        drop(entries);

        self.stats.lock().set_total_entries(total);
        removed
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
        self.stats.lock().set_total_entries(0);
    }

    // == Purge Invalid ==
    /// Removes all invalid entries and returns how many were dropped.
    pub fn purge_invalid(&self) -> usize {
        let mut entries = self.entries.write();
        let purged = self.purge_locked(&mut entries);
        let total = entries.len();
        drop(entries);

        let mut stats = self.stats.lock();
        stats.record_purged(purged);
        stats.set_total_entries(total);
        purged
    }

    fn purge_locked(&self, entries: &mut IndexMap<K, Arc<CacheEntry<V>>>) -> usize {
        let now = self.now_ms();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(self.valid_time_ms, now));
        before - entries.len()
    }

    // == Length ==
    /// Purges invalid entries, then returns the live entry count.
    pub fn len(&self) -> usize {
        self.purge_invalid();
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Stats ==
    /// Returns a consistent snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let total = self.entries.read().len();
        let mut stats = self.stats.lock().clone();
        stats.set_total_entries(total);
        stats
    }

    /// Returns hits / (hits + misses), or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        self.stats.lock().hit_rate()
    }

    pub(crate) fn convert_miss_to_hit(&self) {
        self.stats.lock().convert_miss_to_hit();
    }

    // == Snapshots ==
    /// Live keys in insertion order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.purge_invalid();
        self.entries.read().keys().cloned().collect()
    }

    /// Live entries in insertion order.
    pub fn entries(&self) -> Vec<(K, Arc<CacheEntry<V>>)>
    where
        K: Clone,
    {
        self.purge_invalid();
        self.entries
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
            .collect()
    }

    /// Live entries without their keys.
    pub fn values(&self) -> Vec<Arc<CacheEntry<V>>> {
        self.purge_invalid();
        self.entries.read().values().cloned().collect()
    }

    // == Persistence ==
    /// Writes every live entry to `store` under `tag`.
    pub fn save_to<P>(&self, store: &P, tag: &str) -> Result<usize>
    where
        K: Clone,
        P: Persistence<K, V> + ?Sized,
    {
        let snapshot = self.entries();
        store.save_all(tag, &snapshot)?;
        Ok(snapshot.len())
    }

    /// Loads the entries saved under `tag`, keeping their recorded metadata.
    ///
    /// Entries that are already invalid are skipped. Returns the number stored.
    pub fn load_from<P>(&self, store: &P, tag: &str) -> Result<usize>
    where
        P: Persistence<K, V> + ?Sized,
    {
        let now = self.now_ms();
        let loaded = store
            .load_all(tag)?
            .into_iter()
            .filter(|(_, entry)| entry.is_valid(self.valid_time_ms, now))
            .filter_map(|(key, entry)| self.restore(key, entry))
            .count();
        Ok(loaded)
    }
}

impl<K, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("max_size", &self.max_size)
            .field("valid_time_ms", &self.valid_time_ms)
            .field("size", &self.entries.read().len())
            .field("stats", &*self.stats.lock())
            .finish()
    }
}
