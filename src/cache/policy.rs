//! Eviction Policy Module
//!
//! Pluggable orderings that decide which entry leaves a full cache.
//!
//! A policy is a total order over entries: the entry that sorts first is the
//! most removable one and becomes the eviction victim.

use std::cmp::{Ordering, Reverse};
use std::fs;
use std::path::Path;

use crate::cache::CacheEntry;

// == Eviction Policy Trait ==
/// Orders entries by how eagerly they should be evicted.
pub trait EvictionPolicy<V>: Send + Sync {
    /// Returns `Less` when `a` should be evicted before `b`.
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering;

    /// Returns false for policies that refuse to evict anything.
    fn allows_eviction(&self) -> bool {
        true
    }

    /// Returns the position of the victim among `entries`.
    ///
    /// Runs under the cache's write lock. The default scans once with
    /// [`compare`](Self::compare); policies whose ordering is expensive to
    /// compute override it to rank each entry only once.
    fn select(&self, entries: &[&CacheEntry<V>]) -> Option<usize> {
        let mut victim: Option<usize> = None;
        for (index, &entry) in entries.iter().enumerate() {
            match victim {
                Some(best) if self.compare(entry, entries[best]) != Ordering::Less => {}
                _ => victim = Some(index),
            }
        }
        victim
    }
}

impl<V, F> EvictionPolicy<V> for F
where
    F: Fn(&CacheEntry<V>, &CacheEntry<V>) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        self(a, b)
    }
}

// == Victim Selection ==
/// Returns the position of the entry that sorts first under `policy`.
///
/// On ties the earliest entry in iteration order wins.
pub(crate) fn select_victim<'a, V, I>(policy: &dyn EvictionPolicy<V>, entries: I) -> Option<usize>
where
    V: 'a,
    I: IntoIterator<Item = &'a CacheEntry<V>>,
{
    let entries: Vec<&CacheEntry<V>> = entries.into_iter().collect();
    policy.select(&entries)
}

/// Picks the entry whose `rank` sorts first, computing each rank once.
///
/// On ties the earliest entry wins.
fn select_by_rank<V, R, F>(entries: &[&CacheEntry<V>], mut rank: F) -> Option<usize>
where
    R: Ord,
    F: FnMut(&CacheEntry<V>) -> R,
{
    let mut victim: Option<(usize, R)> = None;
    for (index, &entry) in entries.iter().enumerate() {
        let candidate = rank(entry);
        match &victim {
            Some((_, best)) if candidate >= *best => {}
            _ => victim = Some((index, candidate)),
        }
    }
    victim.map(|(index, _)| index)
}

// == Built-in Policies ==

/// Evicts the entry inserted earliest.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnterTimeFirst;

impl<V> EvictionPolicy<V> for EnterTimeFirst {
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        a.enter_time().cmp(&b.enter_time())
    }
}

/// Evicts the entry read least recently. Never-read entries go first.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastUsedTimeFirst;

impl<V> EvictionPolicy<V> for LastUsedTimeFirst {
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        a.last_used_time().cmp(&b.last_used_time())
    }
}

/// Evicts the entry read the fewest times.
#[derive(Debug, Default, Clone, Copy)]
pub struct UsedCountSmallFirst;

impl<V> EvictionPolicy<V> for UsedCountSmallFirst {
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        a.used_count().cmp(&b.used_count())
    }
}

/// Evicts the entry with the smallest payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataSmallFirst;

impl<V: Ord> EvictionPolicy<V> for DataSmallFirst {
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        a.compare_data(b)
    }
}

/// Evicts the entry with the largest payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataBigFirst;

impl<V: Ord> EvictionPolicy<V> for DataBigFirst {
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        b.compare_data(a)
    }
}

/// Evicts the lowest priority entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityLowFirst;

impl<V> EvictionPolicy<V> for PriorityLowFirst {
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        a.priority().cmp(&b.priority())
    }
}

/// Evicts the highest priority entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityHighFirst;

impl<V> EvictionPolicy<V> for PriorityHighFirst {
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        b.priority().cmp(&a.priority())
    }
}

/// For caches whose values are file paths: evicts the largest file.
///
/// Files that cannot be stat'ed count as empty. Each eviction stats every
/// cached file once while the cache is write-locked.
#[derive(Debug, Default, Clone, Copy)]
pub struct LargestFileFirst;

impl<V: AsRef<Path>> EvictionPolicy<V> for LargestFileFirst {
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        file_len(b.data()).cmp(&file_len(a.data()))
    }

    fn select(&self, entries: &[&CacheEntry<V>]) -> Option<usize> {
        select_by_rank(entries, |entry| Reverse(file_len(entry.data())))
    }
}

/// For caches whose values are file paths: evicts the smallest file.
///
/// Same stat cost as [`LargestFileFirst`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SmallestFileFirst;

impl<V: AsRef<Path>> EvictionPolicy<V> for SmallestFileFirst {
    fn compare(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        file_len(a.data()).cmp(&file_len(b.data()))
    }

    fn select(&self, entries: &[&CacheEntry<V>]) -> Option<usize> {
        select_by_rank(entries, |entry| file_len(entry.data()))
    }
}

/// Refuses eviction: `put` on a full cache returns `None` instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverEvict;

impl<V> EvictionPolicy<V> for NeverEvict {
    fn compare(&self, _a: &CacheEntry<V>, _b: &CacheEntry<V>) -> Ordering {
        Ordering::Equal
    }

    fn allows_eviction(&self) -> bool {
        false
    }
}

fn file_len(path: impl AsRef<Path>) -> u64 {
    fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}
