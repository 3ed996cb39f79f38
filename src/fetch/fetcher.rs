//! Fetcher Module
//!
//! The source a cache falls back to on a miss.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::FetchError;

// == Fetcher Trait ==
/// Produces the value for a missing key.
///
/// Called on a blocking worker thread, never on the caller's task.
/// `Ok(None)` means the source has nothing for this key.
pub trait Fetcher<K, V>: Send + Sync + 'static {
    fn fetch(&self, key: &K) -> Result<Option<V>, FetchError>;
}

impl<K, V, F> Fetcher<K, V> for F
where
    F: Fn(&K) -> Result<Option<V>, FetchError> + Send + Sync + 'static,
{
    fn fetch(&self, key: &K) -> Result<Option<V>, FetchError> {
        self(key)
    }
}

/// Pins a closure's signature so it can be used as a [`Fetcher`].
pub fn fetch_fn<K, V, F>(f: F) -> F
where
    F: Fn(&K) -> Result<Option<V>, FetchError> + Send + Sync + 'static,
{
    f
}

// == File Fetcher ==
/// Reads values from files below a root directory.
///
/// Keys are relative paths. A missing file yields no value; keys that try
/// to leave the root are rejected.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(key);
        let contained = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !contained {
            return Err(FetchError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("key {:?} is not a relative path below the root", key),
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl Fetcher<String, Vec<u8>> for FileFetcher {
    fn fetch(&self, key: &String) -> Result<Option<Vec<u8>>, FetchError> {
        let path = self.resolve(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::OutOfMemory => {
                Err(FetchError::ResourceExhausted(err.to_string()))
            }
            Err(err) => Err(FetchError::Io(err)),
        }
    }
}
