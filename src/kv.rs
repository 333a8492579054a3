//! String key/value storage with `localStorage` semantics: flat keys, text
//! values, a finite quota, and no transactions.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded ({needed} bytes needed, {quota} allowed)")]
    QuotaExceeded { needed: u64, quota: u64 },
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

/// In-process map, used by tests and when no data directory is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: u64) -> Self {
        Self {
            entries: Mutex::default(),
            quota: Some(quota),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota {
            let used: u64 = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let needed = used + entry_size(key, value);
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// One file per key inside a directory. Writes go through a temporary file
/// and a rename so a crash never leaves a half-written value behind.
///
/// With a quota, entry sizes are read from disk on the first write and kept
/// in memory afterwards. The lock around them also serializes writers.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    quota: Option<u64>,
    sizes: Mutex<Option<BTreeMap<String, u64>>>,
}

const VALUE_EXT: &str = "val";
const TMP_EXT: &str = "tmp";

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>, quota: Option<u64>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quota,
            sizes: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.{VALUE_EXT}")))
    }

    fn lock_sizes(&self) -> Result<MutexGuard<'_, Option<BTreeMap<String, u64>>>, StorageError> {
        self.sizes
            .lock()
            .map_err(|_| StorageError::Unavailable("file store lock poisoned".to_string()))
    }

    fn scan_sizes(&self) -> Result<BTreeMap<String, u64>, StorageError> {
        let mut sizes = BTreeMap::new();
        for key in self.keys()? {
            let path = self.path_for(&key)?;
            let len = match fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            sizes.insert(key.clone(), key.len() as u64 + len);
        }
        debug!(entries = sizes.len(), "scanned storage usage");
        Ok(sizes)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let mut sizes = self.lock_sizes()?;

        if let Some(quota) = self.quota {
            if sizes.is_none() {
                *sizes = Some(self.scan_sizes()?);
            }
            let used: u64 = sizes
                .iter()
                .flatten()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(_, size)| size)
                .sum();
            let needed = used + entry_size(key, value);
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }

        let tmp = path.with_extension(TMP_EXT);
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        if let Some(sizes) = sizes.as_mut() {
            sizes.insert(key.to_string(), entry_size(key, value));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let mut sizes = self.lock_sizes()?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        if let Some(sizes) = sizes.as_mut() {
            sizes.remove(key);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(VALUE_EXT) {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) if validate_key(stem).is_ok() => keys.push(stem.to_string()),
                _ => warn!("ignoring stray file in storage dir: {}", path.display()),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("stats-players").unwrap(), None);
        store.set("stats-players", "[]").unwrap();
        store.set("backup-players-1", "[1]").unwrap();
        assert_eq!(store.get("stats-players").unwrap().as_deref(), Some("[]"));
        assert_eq!(
            store.keys().unwrap(),
            vec!["backup-players-1".to_string(), "stats-players".to_string()]
        );
        store.remove("backup-players-1").unwrap();
        store.remove("never-written").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["stats-players".to_string()]);
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn memory_store_basics() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn file_store_basics() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("storage"), None).unwrap();
        exercise(&store);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path(), None).unwrap();
            store.set("stats-settings", "{\"resizeMode\":true}").unwrap();
        }
        let reopened = FileStore::open(dir.path(), None).unwrap();
        assert_eq!(
            reopened.get("stats-settings").unwrap().as_deref(),
            Some("{\"resizeMode\":true}")
        );
    }

    #[test]
    fn quota_counts_keys_and_values() {
        let store = MemoryStore::with_quota(20);
        store.set("a", "123456789").unwrap();
        // replacing a value only counts the new size
        store.set("a", "1234567890123456789").unwrap();
        let err = store.set("b", "x").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { quota: 20, .. }));
        assert_eq!(store.keys().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn file_store_enforces_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), Some(16)).unwrap();
        store.set("key", "0123456789").unwrap();
        assert!(matches!(
            store.set("other", "0123456789"),
            Err(StorageError::QuotaExceeded { .. })
        ));
        assert_eq!(store.get("other").unwrap(), None);
    }

    #[test]
    fn file_store_quota_tracks_existing_and_removed_entries() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::open(dir.path(), None)
            .unwrap()
            .set("key", "0123456789")
            .unwrap();

        let store = FileStore::open(dir.path(), Some(16)).unwrap();
        assert!(matches!(
            store.set("other", "0123456789"),
            Err(StorageError::QuotaExceeded { needed: 28, quota: 16 })
        ));
        // overwriting an entry does not count its old size
        store.set("key", "9876543210").unwrap();

        store.remove("key").unwrap();
        store.set("other", "0123456789").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["other"]);
    }
}
