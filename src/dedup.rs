//! Record identity and deduplication
//!
//! Overlapping fetch passes (a week and its escalated days, adjacent windows
//! sharing a boundary item) can return the same item more than once. Each
//! record kind knows how to name itself; the [`Deduplicator`] keeps the first
//! occurrence of every identity and never drops a record it cannot identify.

use crate::{ActivityRecord, Commit, Event, Issue, PullRequest, RecordKind, Review};
use std::collections::HashSet;

/// Kind-namespaced identity of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    /// Record kind the value belongs to
    pub kind: RecordKind,
    /// Kind-specific identity value
    pub value: String,
}

impl IdentityKey {
    /// Build a key
    pub fn new(kind: RecordKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Extracts a stable identity from a record
pub trait IdentityExtractor {
    /// Identity of this record, or `None` when the data lacks it
    fn identity(&self) -> Option<IdentityKey>;
}

impl IdentityExtractor for Commit {
    fn identity(&self) -> Option<IdentityKey> {
        non_empty(self.sha.as_deref()).map(|sha| IdentityKey::new(RecordKind::Commit, sha))
    }
}

impl IdentityExtractor for PullRequest {
    fn identity(&self) -> Option<IdentityKey> {
        numbered(RecordKind::PullRequest, self.repository.as_deref(), self.number)
    }
}

impl IdentityExtractor for Issue {
    fn identity(&self) -> Option<IdentityKey> {
        numbered(RecordKind::Issue, self.repository.as_deref(), self.number)
    }
}

impl IdentityExtractor for Review {
    fn identity(&self) -> Option<IdentityKey> {
        self.id
            .map(|id| IdentityKey::new(RecordKind::Review, id.to_string()))
    }
}

impl IdentityExtractor for Event {
    fn identity(&self) -> Option<IdentityKey> {
        non_empty(self.id.as_deref()).map(|id| IdentityKey::new(RecordKind::Event, id))
    }
}

impl IdentityExtractor for ActivityRecord {
    fn identity(&self) -> Option<IdentityKey> {
        match self {
            ActivityRecord::Commit(c) => c.identity(),
            ActivityRecord::PullRequest(p) => p.identity(),
            ActivityRecord::Issue(i) => i.identity(),
            ActivityRecord::Review(r) => r.identity(),
            ActivityRecord::Event(e) => e.identity(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn numbered(kind: RecordKind, repository: Option<&str>, number: Option<u64>) -> Option<IdentityKey> {
    let repository = non_empty(repository)?;
    let number = number?;
    Some(IdentityKey::new(kind, format!("{repository}#{number}")))
}

/// Order-preserving, first-wins deduplication
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<IdentityKey>,
    unidentified: usize,
}

impl Deduplicator {
    /// Create an empty deduplicator
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `record` should be kept; remembers its identity
    pub fn admit<R: IdentityExtractor>(&mut self, record: &R) -> bool {
        match record.identity() {
            Some(key) => self.seen.insert(key),
            None => {
                self.unidentified += 1;
                true
            }
        }
    }

    /// Keep the first occurrence of each identity, in input order
    pub fn dedup<R: IdentityExtractor>(&mut self, records: Vec<R>) -> Vec<R> {
        records
            .into_iter()
            .filter(|record| self.admit(record))
            .collect()
    }

    /// Distinct identities seen so far
    pub fn unique_identities(&self) -> usize {
        self.seen.len()
    }

    /// Records admitted without an identity
    pub fn unidentified(&self) -> usize {
        self.unidentified
    }
}

/// One-shot deduplication of a record list
pub fn dedup_records(records: Vec<ActivityRecord>) -> Vec<ActivityRecord> {
    Deduplicator::new().dedup(records)
}
