//! Configuration Module
//!
//! Handles loading cache and fetch settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Auto-fetch cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Entry time-to-live in milliseconds, <= 0 disables expiry
    pub valid_time_ms: i64,
    /// Number of fetches allowed to run at once
    pub pool_size: usize,
    /// Neighbors preloaded after the requested key
    pub forward_count: usize,
    /// Neighbors preloaded before the requested key
    pub backward_count: usize,
    /// Background cleanup interval in seconds, 0 disables the sweeper
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 64)
    /// - `CACHE_VALID_TIME_MS` - Entry TTL in milliseconds (default: -1, never expire)
    /// - `FETCH_POOL_SIZE` - Concurrent fetch limit (default: 8)
    /// - `PRELOAD_FORWARD` - Neighbors preloaded forward (default: 3)
    /// - `PRELOAD_BACKWARD` - Neighbors preloaded backward (default: 1)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 0, disabled)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("CACHE_MAX_ENTRIES", defaults.max_entries),
            valid_time_ms: env_or("CACHE_VALID_TIME_MS", defaults.valid_time_ms),
            pool_size: env_or("FETCH_POOL_SIZE", defaults.pool_size),
            forward_count: env_or("PRELOAD_FORWARD", defaults.forward_count),
            backward_count: env_or("PRELOAD_BACKWARD", defaults.backward_count),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }

    /// The sweeper interval, or `None` when background cleanup is disabled.
    pub fn cleanup_period(&self) -> Option<Duration> {
        (self.cleanup_interval > 0).then(|| Duration::from_secs(self.cleanup_interval))
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 64,
            valid_time_ms: -1,
            pool_size: 8,
            forward_count: 3,
            backward_count: 1,
            cleanup_interval: 0,
        }
    }
}
