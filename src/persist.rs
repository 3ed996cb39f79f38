//! Persistence Module
//!
//! Snapshot storage consulted at application-controlled checkpoints.
//!
//! The cache never decides when to load or save; callers invoke
//! [`BoundedCache::load_from`](crate::cache::BoundedCache::load_from) at
//! startup and [`BoundedCache::save_to`](crate::cache::BoundedCache::save_to)
//! at shutdown.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Persistence Trait ==
/// Loads and saves tagged cache snapshots.
pub trait Persistence<K, V>: Send + Sync {
    /// Returns every entry saved under `tag`, or nothing if no snapshot exists.
    fn load_all(&self, tag: &str) -> Result<Vec<(K, CacheEntry<V>)>>;

    /// Replaces the snapshot stored under `tag`.
    fn save_all(&self, tag: &str, entries: &[(K, Arc<CacheEntry<V>>)]) -> Result<()>;
}

// == Persisted Record ==
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry<K, V> {
    key: K,
    data: V,
    enter_time: u64,
    last_used_time: u64,
    used_count: u64,
    priority: i32,
    expired: bool,
    forever: bool,
}

#[derive(Serialize)]
struct PersistedEntryRef<'a, K, V> {
    key: &'a K,
    data: &'a V,
    enter_time: u64,
    last_used_time: u64,
    used_count: u64,
    priority: i32,
    expired: bool,
    forever: bool,
}

// == JSON File Store ==
/// Stores each tag as `<dir>/<tag>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, tag: &str) -> Result<PathBuf> {
        let valid = !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CacheError::InvalidArgument(format!(
                "Invalid snapshot tag: {:?}",
                tag
            )));
        }
        Ok(self.dir.join(format!("{}.json", tag)))
    }
}

impl<K, V> Persistence<K, V> for JsonFileStore
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    fn load_all(&self, tag: &str) -> Result<Vec<(K, CacheEntry<V>)>> {
        let path = self.path_for(tag)?;
        if !path.exists() {
            debug!(path = %path.display(), "No snapshot to load");
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let records: Vec<PersistedEntry<K, V>> = serde_json::from_reader(reader)?;
        debug!(path = %path.display(), count = records.len(), "Loaded snapshot");

        Ok(records
            .into_iter()
            .map(|record| {
                let entry = CacheEntry::from_parts(
                    record.data,
                    record.enter_time,
                    record.last_used_time,
                    record.used_count,
                    record.priority,
                    record.expired,
                    record.forever,
                );
                (record.key, entry)
            })
            .collect())
    }

    fn save_all(&self, tag: &str, entries: &[(K, Arc<CacheEntry<V>>)]) -> Result<()> {
        let path = self.path_for(tag)?;
        fs::create_dir_all(&self.dir)?;

        let records: Vec<PersistedEntryRef<'_, K, V>> = entries
            .iter()
            .map(|(key, entry)| PersistedEntryRef {
                key,
                data: entry.data(),
                enter_time: entry.enter_time(),
                last_used_time: entry.last_used_time(),
                used_count: entry.used_count(),
                priority: entry.priority(),
                expired: entry.is_expired(),
                forever: entry.is_forever(),
            })
            .collect();

        // Write to a sibling file first so a crash never leaves a torn snapshot.
        let tmp = path.with_extension("json.tmp");
        let mut writer = BufWriter::new(fs::File::create(&tmp)?);
        serde_json::to_writer(&mut writer, &records)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), count = records.len(), "Saved snapshot");
        Ok(())
    }
}
