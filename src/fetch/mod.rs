//! Fetch Module
//!
//! Fetch-on-miss, single-flight coordination and neighbor preloading on top
//! of the bounded cache.

mod auto;
mod coordinator;
mod fetcher;
mod listener;
mod pool;
mod prefetch;

// Re-export public types
pub use auto::{AutoFetchCache, AutoFetchCacheBuilder};
pub use coordinator::{FetchCoordinator, FetchGate};
pub use fetcher::{fetch_fn, FileFetcher, Fetcher};
pub use listener::{FetchListener, NoopListener};
pub use pool::FetchPool;
pub use prefetch::{Direction, Prefetcher};
