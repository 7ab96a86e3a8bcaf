//! Deterministic cache keys
//!
//! A key is the SHA-256 of a canonical JSON rendering of the operation name
//! and its parameters sorted by name. JSON string escaping keeps name/value
//! boundaries unambiguous.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Key of a cached response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    hash: String,
    operation: String,
}

impl CacheKey {
    /// Derive the key for `operation` called with `params`
    ///
    /// Parameter order does not matter. If a name appears twice the last
    /// value wins.
    pub fn derive<K, V>(operation: &str, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let sorted: BTreeMap<&str, &str> = params
            .iter()
            .map(|(name, value)| (name.as_ref(), value.as_ref()))
            .collect();

        // A tuple of a string and a string map cannot fail to serialize
        let canonical = serde_json::to_vec(&(operation, &sorted)).unwrap_or_default();

        let digest = Sha256::digest(&canonical);
        let hash = digest.iter().map(|b| format!("{b:02x}")).collect();

        Self {
            hash,
            operation: operation.to_string(),
        }
    }

    /// Hex-encoded SHA-256 digest
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Operation the key was derived for
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// File name of the entry in a file cache
    pub fn file_name(&self) -> String {
        format!("{}.json", self.hash)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.operation, &self.hash[..12.min(self.hash.len())])
    }
}
