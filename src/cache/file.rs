//! File-backed response cache
//!
//! One JSON document per entry, `<dir>/<key>.json`. The directory is created
//! lazily on the first write so a cache that is never written leaves no trace.

use crate::cache::{ttl_to_chrono, CacheEntry, CacheError, CacheKey, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::output::write_atomic;
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Summary of a cache directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Cache directory
    pub directory: PathBuf,
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
    /// Entry files found
    pub total_entries: usize,
    /// Entries still within their TTL
    pub valid_entries: usize,
    /// Entries past their TTL or unreadable
    pub expired_entries: usize,
    /// Total size of entry files in bytes
    pub total_bytes: u64,
}

/// Directory of JSON cache entries
#[derive(Clone)]
pub struct FileCache {
    directory: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("directory", &self.directory)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl FileCache {
    /// Cache in `directory` whose entries live for `ttl`
    pub fn new(directory: impl AsRef<Path>, ttl: Duration) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            ttl,
            clock: Arc::new(SystemClock),
        }
    }

    /// Evaluate TTLs against `clock` instead of the system time
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Cache directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Path of the entry for `key`
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(key.file_name())
    }

    /// Read and validate the entry at `path`
    pub fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        let entry: CacheEntry =
            serde_json::from_str(&contents).map_err(|e| CacheError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Some(entry))
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.is_expired(self.clock.now(), ttl_to_chrono(self.ttl))
    }

    /// Delete the entry for `key`; returns whether one existed
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let path = self.entry_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Write {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Delete every entry; returns how many were removed
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            if remove_quietly(&path) {
                removed += 1;
            }
        }
        debug!(directory = %self.directory.display(), removed, "Cleared cache");
        Ok(removed)
    }

    /// Delete expired and unreadable entries; returns how many were removed
    pub fn prune_expired(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let stale = match self.read_entry(&path) {
                Ok(Some(entry)) => self.is_expired(&entry),
                Ok(None) => false,
                Err(e) => {
                    debug!(error = %e, "Pruning unreadable cache entry");
                    true
                }
            };
            if stale && remove_quietly(&path) {
                removed += 1;
            }
        }
        debug!(directory = %self.directory.display(), removed, "Pruned cache");
        Ok(removed)
    }

    /// Count entries and their sizes
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats {
            enabled: true,
            directory: self.directory.clone(),
            ttl_secs: self.ttl.as_secs(),
            total_entries: 0,
            valid_entries: 0,
            expired_entries: 0,
            total_bytes: 0,
        };

        for path in self.entry_files()? {
            stats.total_entries += 1;
            stats.total_bytes += std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match self.read_entry(&path) {
                Ok(Some(entry)) if !self.is_expired(&entry) => stats.valid_entries += 1,
                _ => stats.expired_entries += 1,
            }
        }
        Ok(stats)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CacheError::Directory {
                    path: self.directory.clone(),
                    message: e.to_string(),
                })
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json")
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl ResponseCache for FileCache {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        let path = self.entry_path(key);
        let entry = match self.read_entry(&path) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cache entry");
                return None;
            }
        };

        if entry.key != key.hash() {
            warn!(path = %path.display(), "Cache entry key does not match its file name, ignoring");
            return None;
        }

        if self.is_expired(&entry) {
            debug!(key = %key, stored_at = %entry.stored_at, "Cache entry expired");
            return None;
        }

        Some(entry.payload)
    }

    fn put(&self, key: &CacheKey, payload: &Value) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.directory).map_err(|e| CacheError::Directory {
            path: self.directory.clone(),
            message: e.to_string(),
        })?;

        let entry = CacheEntry {
            key: key.hash().to_string(),
            operation: key.operation().to_string(),
            stored_at: self.clock.now(),
            payload: payload.clone(),
        };
        let json =
            serde_json::to_vec(&entry).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let path = self.entry_path(key);
        write_atomic(&path, &json).map_err(|e| CacheError::Write {
            path: path.clone(),
            message: e.to_string(),
        })?;

        debug!(key = %key, path = %path.display(), bytes = json.len(), "Cached response");
        Ok(())
    }
}

fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Failed to remove cache entry");
            }
            false
        }
    }
}
