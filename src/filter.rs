//! Repository include/exclude filtering
//!
//! Patterns match a repository's `owner/name` case-insensitively, with `*`
//! and `?` wildcards (`octo/*` keeps every repository of `octo`). A record
//! passes when the include list is empty or one include pattern matches, and
//! no exclude pattern matches. Records whose repository is unknown always
//! pass.

use crate::ActivityRecord;
use tracing::debug;
use wildmatch::WildMatchPattern;

/// A case-insensitive `owner/name` pattern
pub type RepositoryPattern = WildMatchPattern<'*', '?'>;

/// Include and exclude lists applied to fetched records
#[derive(Debug, Clone, Default)]
pub struct RepositoryFilter {
    include: Vec<RepositoryPattern>,
    exclude: Vec<RepositoryPattern>,
}

impl RepositoryFilter {
    /// Build a filter; blank patterns are ignored
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        Self {
            include: compile(include),
            exclude: compile(exclude),
        }
    }

    /// Whether the filter lets everything through
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Whether `repository` (`owner/name`) passes
    pub fn allows(&self, repository: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(repository)) {
            return false;
        }
        !self.exclude.iter().any(|p| p.matches(repository))
    }

    /// Keep the records that pass, in order
    pub fn apply(&self, records: Vec<ActivityRecord>) -> Vec<ActivityRecord> {
        if self.is_empty() {
            return records;
        }
        let before = records.len();
        let kept: Vec<ActivityRecord> = records
            .into_iter()
            .filter(|record| record.repository().map_or(true, |repo| self.allows(repo)))
            .collect();
        debug!(before, kept = kept.len(), "Applied repository filter");
        kept
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Vec<RepositoryPattern> {
    patterns
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .map(RepositoryPattern::new_case_insensitive)
        .collect()
}
