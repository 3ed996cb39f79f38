//! Autofetch Cache - a bounded concurrent cache that fills itself on a miss
//!
//! Provides pluggable eviction, TTL expiry and hit/miss accounting, plus an
//! auto-fetch layer with single-flight fetching and neighbor preloading.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod persist;
pub mod tasks;

pub use cache::{BoundedCache, CacheEntry, CacheStats, EvictionPolicy};
pub use config::Config;
pub use error::{CacheError, FailureKind, FetchError, Result};
pub use fetch::{AutoFetchCache, Direction, Fetcher, FetchListener};
pub use persist::{JsonFileStore, Persistence};
pub use tasks::spawn_cleanup_task;
