//! Key/value store backends
//!
//! The cache only needs a synchronous string store with get/set/remove and
//! key enumeration, in the shape of browser local storage. Both backends are
//! capacity-bounded; a write that does not fit fails with
//! [`StoreError::QuotaExceeded`] and leaves the previous value in place.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::error::StoreError;

/// Default capacity, matching the usual browser local storage quota (5 MiB)
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Synchronous string key/value store
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is not present
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently held
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys()
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store backed by a concurrent map
///
/// Byte usage is tracked in a counter that is only adjusted while the
/// affected key's shard is locked, so concurrent writers of the same key
/// never see a stale size.
pub struct MemoryStore {
    entries: DashMap<String, String>,
    used: AtomicUsize,
    quota_bytes: usize,
}

impl MemoryStore {
    /// Create a store holding at most `quota_bytes` of keys plus values
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            used: AtomicUsize::new(0),
            quota_bytes,
        }
    }

    /// Bytes currently used by keys and values
    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Swap `replaced` bytes for `needed` bytes, or fail without changing usage
    fn reserve(&self, replaced: usize, needed: usize) -> Result<(), StoreError> {
        let mut available = 0;
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                let base = used.saturating_sub(replaced);
                available = self.quota_bytes.saturating_sub(base);
                (needed <= available).then_some(base + needed)
            })
            .map(|_| ())
            .map_err(|_| StoreError::QuotaExceeded { needed, available })
    }

    fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| Some(used.saturating_sub(bytes)));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let needed = key.len() + value.len();

        // Holds the shard lock until the value is in place
        let entry = self.entries.entry(key.to_string());
        let replaced = match &entry {
            Entry::Occupied(existing) => key.len() + existing.get().len(),
            Entry::Vacant(_) => 0,
        };
        self.reserve(replaced, needed)?;
        entry.insert(value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if let Some((key, value)) = self.entries.remove(key) {
            self.release(key.len() + value.len());
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }
}

// ============================================================================
// Directory-backed store
// ============================================================================

/// Persistent store keeping one file per key
///
/// File names are the hex encoding of the key, so any key string is safe to
/// use and [`keys`](KeyValueStore::keys) can recover the original key. Keys
/// are limited to [`FileStore::MAX_KEY_BYTES`] so the encoded name fits the
/// usual 255-byte file name limit.
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: usize,
}

const FILE_EXTENSION: &str = "entry";

impl FileStore {
    /// Longest key accepted: two hex digits per byte plus `.entry` within
    /// 255 bytes, with room for the temporary suffix
    pub const MAX_KEY_BYTES: usize = 120;

    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_quota(dir, DEFAULT_QUOTA_BYTES)
    }

    pub fn open_with_quota(dir: impl Into<PathBuf>, quota_bytes: usize) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), quota_bytes, "Opened file store");
        Ok(Self { dir, quota_bytes })
    }

    /// Directory holding the entries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.len() > Self::MAX_KEY_BYTES {
            return Err(StoreError::InvalidKey(format!(
                "{} bytes, at most {} allowed",
                key.len(),
                Self::MAX_KEY_BYTES
            )));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", hex::encode(key.as_bytes()), FILE_EXTENSION)))
    }

    fn used_bytes_excluding(&self, skip: &Path) -> Result<usize, StoreError> {
        let mut total = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path == skip || !is_entry_file(&path) {
                continue;
            }
            total += entry.metadata()?.len() as usize;
        }
        Ok(total)
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let used = self.used_bytes_excluding(&path)?;
        let available = self.quota_bytes.saturating_sub(used);

        if value.len() > available {
            return Err(StoreError::QuotaExceeded {
                needed: value.len(),
                available,
            });
        }

        // Write-then-rename so a crash never leaves a truncated entry
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !is_entry_file(&path) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let bytes = hex::decode(stem)
                .map_err(|_| StoreError::InvalidKey(stem.to_string()))?;
            let key = String::from_utf8(bytes)
                .map_err(|_| StoreError::InvalidKey(stem.to_string()))?;
            keys.push(key);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::default();
        assert!(store.get("a").unwrap().is_none());

        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();

        let err = store.set("j", "1234567890").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));

        // Replacing an existing key only counts the new value
        store.set("k", "123456789").unwrap();
        assert_eq!(store.used_bytes(), 10);
    }

    #[test]
    fn test_memory_store_concurrent_writers_keep_usage_consistent() {
        let store = MemoryStore::with_quota(64 * 1024);
        let value = "v".repeat(1_000);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let store = &store;
                let value = value.as_str();
                scope.spawn(move || {
                    for round in 0..500 {
                        if (worker + round) % 2 == 0 {
                            store.set("k", &value[..1_000 - worker]).unwrap();
                        } else {
                            store.remove("k").unwrap();
                        }
                    }
                });
            }
        });

        let actual: usize = store
            .keys()
            .unwrap()
            .iter()
            .map(|k| k.len() + store.get(k).unwrap().map_or(0, |v| v.len()))
            .sum();
        assert_eq!(store.used_bytes(), actual);
    }

    #[test]
    fn test_memory_store_remove_frees_quota() {
        let store = MemoryStore::with_quota(10);
        store.set("a", "123456789").unwrap();
        assert!(store.set("b", "1").is_err());

        store.remove("a").unwrap();
        assert_eq!(store.used_bytes(), 0);
        store.set("b", "1").unwrap();
    }

    #[test]
    fn test_file_store_rejects_oversized_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let longest = "k".repeat(FileStore::MAX_KEY_BYTES);
        store.set(&longest, "ok").unwrap();
        assert_eq!(store.get(&longest).unwrap().as_deref(), Some("ok"));

        let too_long = "k".repeat(FileStore::MAX_KEY_BYTES + 1);
        assert!(matches!(store.set(&too_long, "x"), Err(StoreError::InvalidKey(_))));
        assert_eq!(store.keys().unwrap(), vec![longest]);
    }

    #[test]
    fn test_file_store_keys_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set("agent-discovery:agents:84532", "[]").unwrap();
            store.set("other/app key", "x").unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["agent-discovery:agents:84532", "other/app key"]);
        assert_eq!(store.get("other/app key").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_file_store_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open_with_quota(dir.path(), 8).unwrap();

        store.set("a", "1234").unwrap();
        assert!(store.set("b", "12345").is_err());
        assert!(store.get("b").unwrap().is_none());

        // Overwriting does not count the old value twice
        store.set("a", "12345678").unwrap();
    }
}
