//! Agent Cache Core - Namespaced TTL Cache
//!
//! A small expiring cache used to keep the results of on-chain discovery
//! around between runs. Values are JSON-encoded into a string key/value
//! store, so any backend that can hold strings can persist them:
//!
//! - [`MemoryStore`]: process-local, quota-bounded (tests, short-lived tools)
//! - [`FileStore`]: one file per key under a directory (CLI runs, daemons)
//!
//! # Example
//!
//! ```rust
//! use agent_cache_core::{MemoryStore, TtlCache};
//! use std::time::Duration;
//!
//! let cache = TtlCache::new(MemoryStore::default());
//! cache.set("agents:11155111", &vec![1u64, 2, 3], Duration::from_secs(300));
//!
//! let ids: Option<Vec<u64>> = cache.get("agents:11155111");
//! assert_eq!(ids, Some(vec![1, 2, 3]));
//! ```
//!
//! Caching is an optimization, never a correctness requirement: write
//! failures are logged and dropped, and an expired entry reads exactly like
//! a missing one.

pub mod error;
pub mod store;
pub mod ttl;

pub use error::{CacheError, Result, StoreError};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use ttl::{CacheEntry, Clock, ManualClock, SystemClock, TtlCache, DEFAULT_NAMESPACE, NAMESPACE_SEPARATOR};
