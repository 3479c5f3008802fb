//! Expiring cache entries over a [`KeyValueStore`]

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::KeyValueStore;

/// Prefix applied to every key written by the cache
pub const DEFAULT_NAMESPACE: &str = "agent-discovery:";

/// Separator closing a namespace, so `app` never matches `app-legacy:` keys
pub const NAMESPACE_SEPARATOR: char = ':';

/// Millisecond wall clock used to stamp and expire entries
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Hand-driven clock for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A stored value with its write time and lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Milliseconds since the Unix epoch when the value was written
    pub stored_at: u64,
    /// Lifetime in milliseconds
    pub ttl: u64,
}

impl<T> CacheEntry<T> {
    /// An entry is expired once strictly more than `ttl` has elapsed
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.stored_at) > self.ttl
    }
}

/// Namespaced TTL cache
///
/// Reads of an expired entry delete it and report a miss. Writes never
/// surface errors: a value that cannot be stored is logged and dropped.
pub struct TtlCache<S> {
    store: S,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> TtlCache<S> {
    /// Create a cache over `store` using the default namespace and system clock
    pub fn new(store: S) -> Self {
        Self {
            store,
            namespace: DEFAULT_NAMESPACE.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different key prefix
    ///
    /// A missing trailing `:` is appended. A blank namespace keeps the
    /// default one, since it would make [`clear`](Self::clear) reach every
    /// key in the store.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let mut namespace = namespace.into().trim().to_string();
        if namespace.is_empty() {
            warn!(default = DEFAULT_NAMESPACE, "Blank cache namespace, keeping the default");
            return self;
        }
        if !namespace.ends_with(NAMESPACE_SEPARATOR) {
            namespace.push(NAMESPACE_SEPARATOR);
        }
        self.namespace = namespace;
        self
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Access the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Read a live value, `None` on miss, expiry or undecodable entry
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let storage_key = self.storage_key(key);

        let raw = match self.store.get(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Cache read failed");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Dropping undecodable cache entry");
                self.remove_quietly(&storage_key);
                return None;
            }
        };

        if entry.is_expired(self.clock.now_ms()) {
            debug!(key = %storage_key, "Cache entry expired");
            self.remove_quietly(&storage_key);
            return None;
        }

        Some(entry.data)
    }

    /// Write a value, logging and discarding any failure
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.try_set(key, value, ttl) {
            warn!(key = %self.storage_key(key), error = %e, "Cache write failed");
        }
    }

    /// Write a value, returning the failure to the caller
    pub fn try_set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            data: value,
            stored_at: self.clock.now_ms(),
            ttl: ttl.as_millis() as u64,
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.set(&self.storage_key(key), &raw)?;
        Ok(())
    }

    /// Remove one entry, or every entry under this cache's namespace
    ///
    /// Keys outside the namespace are never touched.
    pub fn clear(&self, key: Option<&str>) {
        match key {
            Some(key) => self.remove_quietly(&self.storage_key(key)),
            None => self.clear_prefix(""),
        }
    }

    /// Remove every entry whose (un-namespaced) key starts with `prefix`
    pub fn clear_prefix(&self, prefix: &str) {
        let full_prefix = self.storage_key(prefix);
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Cache key listing failed");
                return;
            }
        };

        let mut removed = 0usize;
        for key in keys.iter().filter(|k| k.starts_with(&full_prefix)) {
            self.remove_quietly(key);
            removed += 1;
        }
        debug!(prefix = %full_prefix, removed, "Cleared cache entries");
    }

    fn remove_quietly(&self, storage_key: &str) {
        if let Err(e) = self.store.remove(storage_key) {
            warn!(key = %storage_key, error = %e, "Cache delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache_with_clock() -> (TtlCache<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = TtlCache::new(MemoryStore::default()).with_clock(clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_get_before_and_after_expiry() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", &"value".to_string(), Duration::from_millis(100));

        assert_eq!(cache.get::<String>("k").as_deref(), Some("value"));

        clock.advance(Duration::from_millis(150));
        assert!(cache.get::<String>("k").is_none());
        // Purged, not skipped
        assert!(cache.store().get("agent-discovery:k").unwrap().is_none());
        assert!(cache.get::<String>("k").is_none());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", &1u32, Duration::from_millis(100));

        clock.advance(Duration::from_millis(100));
        assert_eq!(cache.get::<u32>("k"), Some(1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get::<u32>("k"), None);
    }

    #[test]
    fn test_set_overwrites() {
        let (cache, _) = cache_with_clock();
        cache.set("k", &1u32, Duration::from_secs(1));
        cache.set("k", &2u32, Duration::from_secs(1));
        assert_eq!(cache.get::<u32>("k"), Some(2));
    }

    #[test]
    fn test_set_over_quota_is_silent() {
        let cache = TtlCache::new(MemoryStore::with_quota(16));
        cache.set("big", &"x".repeat(1024), Duration::from_secs(60));
        assert!(cache.get::<String>("big").is_none());
        assert!(cache.try_set("big", &"x".repeat(1024), Duration::from_secs(60)).is_err());
    }

    #[test]
    fn test_clear_respects_namespace() {
        let store = Arc::new(MemoryStore::default());
        store.set("unrelated", "keep me").unwrap();

        let cache = TtlCache::new(store.clone());
        cache.set("a", &1u8, Duration::from_secs(60));
        cache.set("b", &2u8, Duration::from_secs(60));

        cache.clear(Some("a"));
        assert!(cache.get::<u8>("a").is_none());
        assert_eq!(cache.get::<u8>("b"), Some(2));

        cache.clear(None);
        assert!(cache.get::<u8>("b").is_none());
        assert_eq!(store.get("unrelated").unwrap().as_deref(), Some("keep me"));
    }

    #[test]
    fn test_namespace_gets_separator() {
        let store = Arc::new(MemoryStore::default());
        store.set("agent-discovery-legacy:agents:1", "old app").unwrap();

        let cache = TtlCache::new(store.clone()).with_namespace("agent-discovery");
        assert_eq!(cache.namespace(), "agent-discovery:");

        cache.set("agents:1", &1u8, Duration::from_secs(60));
        cache.clear(None);
        assert!(cache.get::<u8>("agents:1").is_none());
        assert_eq!(
            store.get("agent-discovery-legacy:agents:1").unwrap().as_deref(),
            Some("old app")
        );
    }

    #[test]
    fn test_blank_namespace_keeps_default() {
        let store = Arc::new(MemoryStore::default());
        store.set("wallet:last-connector", "injected").unwrap();

        let cache = TtlCache::new(store.clone()).with_namespace("  ");
        assert_eq!(cache.namespace(), DEFAULT_NAMESPACE);

        cache.set("agents:1", &1u8, Duration::from_secs(60));
        cache.clear(None);
        assert_eq!(store.get("wallet:last-connector").unwrap().as_deref(), Some("injected"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_undecodable_entry_is_dropped() {
        let (cache, _) = cache_with_clock();
        cache.store().set("agent-discovery:k", "not json").unwrap();
        assert!(cache.get::<u32>("k").is_none());
        assert!(cache.store().get("agent-discovery:k").unwrap().is_none());
    }
}
