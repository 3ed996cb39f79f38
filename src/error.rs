//! Error types for the cache library
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised while constructing or persisting caches.
///
/// Lookups and insertions never fail with an error: an absent or refused
/// entry is reported as `None`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A required argument was missing or out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No tokio runtime was available to drive fetch workers
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// Reading or writing a persisted snapshot failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// A persisted snapshot could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Failure Kind ==
/// Coarse classification of a fetch failure, handed to failure listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network, storage or missing-data failure
    Io,
    /// Memory or capacity exhaustion
    ResourceExhausted,
}

// == Fetch Error Enum ==
/// Failure of a single fetch attempt.
///
/// Fetch errors never escape to callers of `get_or_fetch`; waiters observe
/// an absent value and listeners receive the error.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The underlying source could not be read
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The fetcher ran out of memory or another bounded resource
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The fetcher completed without producing a value
    #[error("Fetcher returned no data")]
    Empty,

    /// The value was fetched but the full cache refused to store it
    #[error("Cache refused the fetched value")]
    Refused,

    /// The fetcher panicked or its worker was torn down
    #[error("Fetch worker failed: {0}")]
    Worker(String),
}

impl FetchError {
    /// Returns the failure class reported to listeners.
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::ResourceExhausted(_) | FetchError::Refused => {
                FailureKind::ResourceExhausted
            }
            FetchError::Io(_) | FetchError::Empty | FetchError::Worker(_) => FailureKind::Io,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache library.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kinds() {
        let io = FetchError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.kind(), FailureKind::Io);
        assert_eq!(FetchError::Empty.kind(), FailureKind::Io);
        assert_eq!(
            FetchError::ResourceExhausted("heap".to_string()).kind(),
            FailureKind::ResourceExhausted
        );
        assert_eq!(FetchError::Refused.kind(), FailureKind::ResourceExhausted);
    }

    #[test]
    fn test_error_messages() {
        let err = CacheError::InvalidArgument("max_size must be > 0".to_string());
        assert_eq!(err.to_string(), "Invalid argument: max_size must be > 0");
        assert_eq!(FetchError::Empty.to_string(), "Fetcher returned no data");
    }
}
