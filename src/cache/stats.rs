//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
///
/// The cache keeps one instance behind a lock and hands out copies, so a
/// snapshot always has mutually consistent counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of lookups that found a valid entry
    pub hits: u64,
    /// Number of lookups that found nothing or an invalid entry
    pub misses: u64,
    /// Number of entries removed to make room for new ones
    pub evictions: u64,
    /// Number of invalid entries purged
    pub purged: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Convert Miss To Hit ==
    /// Re-books one previously recorded miss as a hit.
    ///
    /// Used when a caller that missed joined another caller's fetch and
    /// ended up served. Does nothing if no miss is on record.
    pub fn convert_miss_to_hit(&mut self) {
        if self.misses > 0 {
            self.misses -= 1;
            self.hits += 1;
        }
    }

    // == Record Eviction ==
    /// Increments the eviction counter.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Record Purge ==
    /// Adds `count` purged invalid entries.
    pub fn record_purged(&mut self, count: usize) {
        self.purged += count as u64;
    }

    // == Update Entry Count ==
    /// Updates the total entries count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
