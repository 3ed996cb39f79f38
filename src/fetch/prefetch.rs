//! Prefetch Module
//!
//! Directional neighbor preloading over an ordered key list.

use std::hash::Hash;

use tracing::debug;

use crate::fetch::FetchCoordinator;

/// Which way to walk from the requested key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

// == Prefetcher ==
/// How many neighbors to warm on each side of a requested key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefetcher {
    forward_count: usize,
    backward_count: usize,
}

impl Prefetcher {
    pub fn new(forward_count: usize, backward_count: usize) -> Self {
        Self {
            forward_count,
            backward_count,
        }
    }

    pub fn forward_count(&self) -> usize {
        self.forward_count
    }

    pub fn backward_count(&self) -> usize {
        self.backward_count
    }

    pub fn count_for(&self, direction: Direction) -> usize {
        match direction {
            Direction::Forward => self.forward_count,
            Direction::Backward => self.backward_count,
        }
    }

    /// Dispatches background fetches for up to `count` neighbors of `key`.
    ///
    /// Never waits. Returns how many fetches were actually started; keys
    /// already cached or already in flight are skipped.
    pub fn preload<K, V>(
        &self,
        coordinator: &FetchCoordinator<K, V>,
        key: &K,
        ordered: &[K],
        direction: Direction,
        count: usize,
    ) -> usize
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let dispatched = window(key, ordered, direction, count)
            .into_iter()
            .filter(|neighbor| coordinator.dispatch(neighbor))
            .count();
        debug!(?direction, count, dispatched, "Preloaded neighbors");
        dispatched
    }

    /// Preloads forward then backward using the configured counts.
    pub fn preload_neighbors<K, V>(
        &self,
        coordinator: &FetchCoordinator<K, V>,
        key: &K,
        ordered: &[K],
    ) -> usize
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        [Direction::Forward, Direction::Backward]
            .into_iter()
            .map(|direction| {
                self.preload(coordinator, key, ordered, direction, self.count_for(direction))
            })
            .sum()
    }
}

impl Default for Prefetcher {
    fn default() -> Self {
        Self::new(3, 1)
    }
}

/// The neighbors examined when preloading around `key`.
///
/// Starts at the first occurrence of `key` and walks `direction`, skipping
/// repeats of `key` itself. The window is positional: at most `count` keys
/// are returned whether or not they end up being fetched.
pub(crate) fn window<'a, K: Eq>(
    key: &K,
    ordered: &'a [K],
    direction: Direction,
    count: usize,
) -> Vec<&'a K> {
    let Some(position) = ordered.iter().position(|candidate| candidate == key) else {
        return Vec::new();
    };

    let neighbors: Box<dyn Iterator<Item = &'a K>> = match direction {
        Direction::Forward => Box::new(ordered[position + 1..].iter()),
        Direction::Backward => Box::new(ordered[..position].iter().rev()),
    };
    neighbors
        .filter(|candidate| *candidate != key)
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::BoundedCache;
    use crate::fetch::{fetch_fn, FetchPool, NoopListener};

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_window_forward_and_backward() {
        let ordered = keys(&["k0", "k1", "k2", "k3", "k4"]);
        let key = "k2".to_string();

        assert_eq!(window(&key, &ordered, Direction::Forward, 1), vec!["k3"]);
        assert_eq!(window(&key, &ordered, Direction::Backward, 1), vec!["k1"]);
        assert_eq!(
            window(&key, &ordered, Direction::Backward, 5),
            vec!["k1", "k0"]
        );
    }

    #[test]
    fn test_window_skips_requested_key_and_handles_absence() {
        let ordered = keys(&["a", "b", "a", "c"]);

        assert_eq!(
            window(&"a".to_string(), &ordered, Direction::Forward, 2),
            vec!["b", "c"]
        );
        assert!(window(&"z".to_string(), &ordered, Direction::Forward, 2).is_empty());
        assert!(window(&"a".to_string(), &[], Direction::Forward, 2).is_empty());
        assert!(window(&"a".to_string(), &ordered, Direction::Forward, 0).is_empty());
    }

    #[tokio::test]
    async fn test_preload_skips_cached_neighbors() {
        let cache = Arc::new(BoundedCache::new(10).unwrap());
        cache.put("k3".to_string(), "cached".to_string());
        let coordinator = FetchCoordinator::new(
            Arc::clone(&cache),
            Arc::new(fetch_fn(|key: &String| Ok(Some(key.clone())))),
            Arc::new(NoopListener),
            FetchPool::new(2).unwrap(),
            Arc::new(|| true),
        );
        let prefetcher = Prefetcher::new(2, 1);
        let ordered = keys(&["k0", "k1", "k2", "k3", "k4"]);

        // k3 is cached, so only k4 is dispatched going forward
        let key = "k2".to_string();
        assert_eq!(
            prefetcher.preload(&coordinator, &key, &ordered, Direction::Forward, 2),
            1
        );
        assert_eq!(
            prefetcher.preload(&coordinator, &key, &ordered, Direction::Backward, 1),
            1
        );
    }

    #[test]
    fn test_count_for_direction() {
        let prefetcher = Prefetcher::new(4, 2);
        assert_eq!(prefetcher.count_for(Direction::Forward), 4);
        assert_eq!(prefetcher.count_for(Direction::Backward), 2);
        assert_eq!(Prefetcher::default(), Prefetcher::new(3, 1));
    }
}
