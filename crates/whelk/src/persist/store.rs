//! Key/value blob stores for persisted shell state.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::NamedTempFile;

use super::PersistError;

/// A string-valued key/value store.
///
/// Calls are synchronous: the shell persists from inside filesystem
/// mutation callbacks.
pub trait BlobStore: Send + Sync {
    /// The value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;

    /// Store `value` under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;

    /// Delete `key`. Deleting a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// Process-local store; the volatile tier.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory; the durable tier.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store files under `dir`, creating it on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl BlobStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir)?;
        let mut staging = NamedTempFile::new_in(&self.dir)?;
        staging.write_all(value.as_bytes())?;
        staging.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A fast volatile tier in front of a durable tier.
///
/// Reads prefer the volatile tier; writes and removals go to both.
#[derive(Clone)]
pub struct TieredStore {
    volatile: Arc<dyn BlobStore>,
    durable: Arc<dyn BlobStore>,
}

impl fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredStore").finish_non_exhaustive()
    }
}

impl Default for TieredStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl TieredStore {
    /// Combine two tiers.
    pub fn new(volatile: Arc<dyn BlobStore>, durable: Arc<dyn BlobStore>) -> Self {
        Self { volatile, durable }
    }

    /// Two independent in-memory tiers.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// A memory tier in front of a [`FileStore`] at `dir`.
    pub fn with_file_backing(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(FileStore::new(dir)))
    }

    /// The volatile tier.
    pub fn volatile(&self) -> &dyn BlobStore {
        self.volatile.as_ref()
    }

    /// The durable tier.
    pub fn durable(&self) -> &dyn BlobStore {
        self.durable.as_ref()
    }
}

impl BlobStore for TieredStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match self.volatile.get(key)? {
            Some(value) => Ok(Some(value)),
            None => self.durable.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let volatile = self.volatile.set(key, value);
        let durable = self.durable.set(key, value);
        volatile.and(durable)
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let volatile = self.volatile.remove(key);
        let durable = self.durable.remove(key);
        volatile.and(durable)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));
        assert_eq!(store.get("whelk:shell-state:v1").unwrap(), None);

        store.set("whelk:shell-state:v1", "{}").unwrap();
        assert!(dir.path().join("state/whelk_shell-state_v1.json").exists());
        assert_eq!(store.get("whelk:shell-state:v1").unwrap().as_deref(), Some("{}"));

        store.remove("whelk:shell-state:v1").unwrap();
        store.remove("whelk:shell-state:v1").unwrap();
        assert_eq!(store.get("whelk:shell-state:v1").unwrap(), None);
    }

    #[test]
    fn test_file_store_overwrite_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set("k", "first").unwrap();
        store.set("k", "second").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("second"));

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k.json"]);
    }

    #[test]
    fn test_tiered_reads_prefer_volatile() {
        let volatile = Arc::new(MemoryStore::new());
        let durable = Arc::new(MemoryStore::new());
        let tiered = TieredStore::new(volatile.clone(), durable.clone());

        durable.set("k", "durable").unwrap();
        assert_eq!(tiered.get("k").unwrap().as_deref(), Some("durable"));

        volatile.set("k", "volatile").unwrap();
        assert_eq!(tiered.get("k").unwrap().as_deref(), Some("volatile"));

        tiered.set("k", "both").unwrap();
        assert_eq!(volatile.get("k").unwrap().as_deref(), Some("both"));
        assert_eq!(durable.get("k").unwrap().as_deref(), Some("both"));

        tiered.remove("k").unwrap();
        assert_eq!(tiered.get("k").unwrap(), None);
    }
}
