//! In-memory response cache
//!
//! Same TTL semantics as the file cache, without persistence. Useful for
//! embedding the controller in a long-running process and for tests.

use crate::cache::{ttl_to_chrono, CacheEntry, CacheError, CacheKey, ResponseCache};
use crate::clock::{Clock, SystemClock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Process-local cache
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl MemoryCache {
    /// Empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            clock: Arc::new(SystemClock),
        }
    }

    /// Evaluate TTLs against `clock` instead of the system time
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a raw payload without going through `put`, for seeding tests
    pub fn insert_raw(&self, key: &CacheKey, payload: Value) {
        let entry = CacheEntry {
            key: key.hash().to_string(),
            operation: key.operation().to_string(),
            stored_at: self.clock.now(),
            payload,
        };
        self.lock().insert(entry.key.clone(), entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = self.clock.now();
        let ttl = ttl_to_chrono(self.ttl);
        let mut entries = self.lock();

        let expired = entries.get(key.hash())?.is_expired(now, ttl);
        if expired {
            entries.remove(key.hash());
            return None;
        }
        entries.get(key.hash()).map(|entry| entry.payload.clone())
    }

    fn put(&self, key: &CacheKey, payload: &Value) -> Result<(), CacheError> {
        self.insert_raw(key, payload.clone());
        Ok(())
    }
}
