//! Fetch Listener Module
//!
//! Completion callbacks for auto-fetch lookups.

use std::sync::Arc;

use crate::cache::CacheEntry;
use crate::error::{FailureKind, FetchError};

/// Observes how lookups resolve.
///
/// Callbacks run on whichever task resolved the lookup. Embedders that need
/// a specific thread (a UI loop, say) re-dispatch from here.
pub trait FetchListener<K, V>: Send + Sync + 'static {
    /// Called when a value is available: `was_cached` is true for a cache hit
    /// and false right after a fetch stored it.
    fn on_success(&self, _key: &K, _entry: &Arc<CacheEntry<V>>, _was_cached: bool) {}

    /// Called when a fetch produced nothing, failed, or could not be stored.
    fn on_failure(&self, _key: &K, _kind: FailureKind, _cause: &FetchError) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl<K, V> FetchListener<K, V> for NoopListener {}
