//! Cache Module
//!
//! Bounded in-memory caching with TTL expiry and pluggable eviction.

mod clock;
mod entry;
mod policy;
mod stats;
mod store;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use policy::{
    DataBigFirst, DataSmallFirst, EnterTimeFirst, EvictionPolicy, LargestFileFirst,
    LastUsedTimeFirst, NeverEvict, PriorityHighFirst, PriorityLowFirst, SmallestFileFirst,
    UsedCountSmallFirst,
};
pub use stats::CacheStats;
pub use store::{BoundedCache, NO_EXPIRY};
