//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with usage metadata.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// == Cache Entry ==
/// A cached value plus the metadata eviction policies and expiry look at.
///
/// Entries are shared as `Arc<CacheEntry<V>>` once stored. Reads update
/// `used_count` and `last_used_time` in place through atomics, so a lookup
/// never needs exclusive access to the entry.
#[derive(Debug)]
pub struct CacheEntry<V> {
    /// The stored value
    data: V,
    /// Insertion timestamp (Unix milliseconds)
    enter_time: u64,
    /// Last successful read (Unix milliseconds), 0 if never read
    last_used_time: AtomicU64,
    /// Number of successful reads
    used_count: AtomicU64,
    /// User-assigned priority for priority-based eviction
    priority: i32,
    /// Explicit expiry flag, independent of time-based expiry
    expired: AtomicBool,
    /// Exempt from every form of expiry
    forever: bool,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry with default metadata.
    ///
    /// The enter time is stamped by the cache on insertion.
    pub fn new(data: V) -> Self {
        Self {
            data,
            enter_time: 0,
            last_used_time: AtomicU64::new(0),
            used_count: AtomicU64::new(0),
            priority: 0,
            expired: AtomicBool::new(false),
            forever: false,
        }
    }

    /// Sets the eviction priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Marks the entry as exempt from expiry.
    pub fn with_forever(mut self, forever: bool) -> Self {
        self.forever = forever;
        self
    }

    /// Pre-sets the explicit expiry flag.
    pub fn with_expired(self, expired: bool) -> Self {
        self.expired.store(expired, Ordering::Relaxed);
        self
    }

    // == Accessors ==
    pub fn data(&self) -> &V {
        &self.data
    }

    pub fn into_data(self) -> V {
        self.data
    }

    pub fn enter_time(&self) -> u64 {
        self.enter_time
    }

    pub fn last_used_time(&self) -> u64 {
        self.last_used_time.load(Ordering::Acquire)
    }

    pub fn used_count(&self) -> u64 {
        self.used_count.load(Ordering::Acquire)
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the explicit expiry flag. Time-based expiry is not reflected here.
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    pub fn is_forever(&self) -> bool {
        self.forever
    }

    // == Mark Expired ==
    /// Flags the entry as expired. Forever entries ignore the flag.
    pub fn mark_expired(&self) {
        self.expired.store(true, Ordering::Release);
    }

    // == Is Valid ==
    /// Checks whether the entry may still be served.
    ///
    /// An entry is invalid when it carries the expiry flag, or when the
    /// cache-wide valid time is positive and has elapsed since insertion.
    /// Forever entries are always valid.
    pub fn is_valid(&self, valid_time_ms: i64, now_ms: u64) -> bool {
        if self.forever {
            return true;
        }
        if self.is_expired() {
            return false;
        }
        match u64::try_from(valid_time_ms) {
            Ok(valid) if valid > 0 => now_ms <= self.enter_time.saturating_add(valid),
            _ => true,
        }
    }

    // == Compare Data ==
    /// Orders two entries by their payload only.
    pub fn compare_data(&self, other: &Self) -> CmpOrdering
    where
        V: Ord,
    {
        self.data.cmp(&other.data)
    }

    /// Records a successful read.
    pub(crate) fn touch(&self, now_ms: u64) {
        self.used_count.fetch_add(1, Ordering::AcqRel);
        self.last_used_time.store(now_ms, Ordering::Release);
    }

    pub(crate) fn stamp(&mut self, now_ms: u64) {
        self.enter_time = now_ms;
    }

    /// Rebuilds an entry with previously recorded metadata.
    pub(crate) fn from_parts(
        data: V,
        enter_time: u64,
        last_used_time: u64,
        used_count: u64,
        priority: i32,
        expired: bool,
        forever: bool,
    ) -> Self {
        Self {
            data,
            enter_time,
            last_used_time: AtomicU64::new(last_used_time),
            used_count: AtomicU64::new(used_count),
            priority,
            expired: AtomicBool::new(expired),
            forever,
        }
    }
}

impl<V: Clone> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self::from_parts(
            self.data.clone(),
            self.enter_time,
            self.last_used_time(),
            self.used_count(),
            self.priority,
            self.is_expired(),
            self.forever,
        )
    }
}

impl<V: PartialEq> PartialEq for CacheEntry<V> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && self.enter_time == other.enter_time
            && self.priority == other.priority
            && self.is_expired() == other.is_expired()
            && self.forever == other.forever
    }
}
