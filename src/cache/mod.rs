//! Response cache
//!
//! Maps a deterministic [`CacheKey`] to a JSON payload with a TTL. Reads are
//! fail-open: anything that cannot be read or decoded is a miss. Writes are
//! atomic so concurrent runs sharing a directory never observe a partial
//! entry.

use crate::config::CacheConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub mod file;
pub mod key;
pub mod memory;

pub use file::{CacheStats, FileCache};
pub use key::CacheKey;
pub use memory::MemoryCache;

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Entry exists but could not be read
    #[error("failed to read cache entry {path}: {message}")]
    Read {
        /// Entry path
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// Entry was read but is not a valid cache document
    #[error("corrupt cache entry {path}: {message}")]
    Corrupt {
        /// Entry path
        path: PathBuf,
        /// Why it was rejected
        message: String,
    },

    /// Entry could not be written
    #[error("failed to write cache entry {path}: {message}")]
    Write {
        /// Entry path
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// Cache directory could not be created or listed
    #[error("cache directory {path}: {message}")]
    Directory {
        /// Directory path
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// Payload could not be serialized
    #[error("failed to serialize cache entry: {0}")]
    Serialization(String),
}

/// One stored response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex key the entry was stored under
    pub key: String,
    /// Operation that produced the payload
    pub operation: String,
    /// When the payload was stored
    pub stored_at: DateTime<Utc>,
    /// Cached response
    pub payload: Value,
}

impl CacheEntry {
    /// Whether the entry is older than `ttl` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.stored_at) > ttl
    }
}

/// Key to payload store with expiry
pub trait ResponseCache: Send + Sync {
    /// Stored payload for `key`, or `None` on a miss (absent, expired or unreadable)
    fn get(&self, key: &CacheKey) -> Option<Value>;

    /// Store `payload` under `key`, replacing any previous entry
    fn put(&self, key: &CacheKey, payload: &Value) -> Result<(), CacheError>;

    /// Whether this cache stores anything at all
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Disabled cache: always misses, never touches storage
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ResponseCache for NoCache {
    fn get(&self, _key: &CacheKey) -> Option<Value> {
        None
    }

    fn put(&self, _key: &CacheKey, _payload: &Value) -> Result<(), CacheError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the cache described by `config`
///
/// An enabled cache is file-backed; its directory is created on first write.
pub fn open_cache(config: &CacheConfig) -> Arc<dyn ResponseCache> {
    if config.enabled {
        Arc::new(FileCache::new(&config.directory, config.ttl))
    } else {
        Arc::new(NoCache)
    }
}

/// Longest TTL representable without overflow
const MAX_TTL_DAYS: i64 = 365 * 1000;

pub(crate) fn ttl_to_chrono(ttl: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl)
        .ok()
        .filter(|ttl| *ttl <= chrono::Duration::days(MAX_TTL_DAYS))
        .unwrap_or_else(|| chrono::Duration::days(MAX_TTL_DAYS))
}
