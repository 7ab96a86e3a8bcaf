//! Adaptive fetch orchestration
//!
//! The [`AdaptiveFetchController`] walks a date range window by window,
//! serving each unit from the response cache or from the gateway under the
//! retry policy, escalating busy windows to day-level fetches, and collecting
//! failures instead of aborting.

use crate::cache::CacheKey;
use crate::config::ConfigError;
use crate::gateway::CallError;
use crate::retry::ErrorClass;
use crate::window::WindowError;
use crate::{ActivityRecord, FetchWindow, RecordKind};
use chrono::NaiveDate;
use serde::Serialize;

pub mod controller;
pub mod pulls;

pub use controller::AdaptiveFetchController;
pub use pulls::{pull_request_targets, ReviewSide};

/// Fetch errors that prevent a run from starting
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Requested range is malformed
    #[error(transparent)]
    InvalidRange(#[from] WindowError),

    /// Controller configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Smallest piece of work the controller fetches and caches
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum FetchUnit {
    /// A window of up to seven days
    Window {
        /// Window fetched
        window: FetchWindow,
    },
    /// One day of an escalated window
    Day {
        /// Day fetched
        day: NaiveDate,
    },
    /// Records attached to one item (e.g. reviews of a pull request)
    Related {
        /// Owning container
        parent: String,
        /// Item within the container
        child: String,
    },
}

impl FetchUnit {
    /// Cache key of this unit for `kind` and `identity` served by `source`
    ///
    /// `source` names the API root (see [`CallGateway::source`]). A day and a
    /// single-day window are the same request and share a key.
    ///
    /// [`CallGateway::source`]: crate::gateway::CallGateway::source
    pub fn cache_key(&self, kind: RecordKind, identity: &str, source: &str) -> CacheKey {
        let source = ("source", source.to_string());
        match self {
            FetchUnit::Window { window } => CacheKey::derive(
                &format!("window:{kind}"),
                &[
                    source,
                    ("identity", identity.to_string()),
                    ("start", window.start().to_string()),
                    ("end", window.end().to_string()),
                ],
            ),
            FetchUnit::Day { day } => CacheKey::derive(
                &format!("window:{kind}"),
                &[
                    source,
                    ("identity", identity.to_string()),
                    ("start", day.to_string()),
                    ("end", day.to_string()),
                ],
            ),
            FetchUnit::Related { parent, child } => CacheKey::derive(
                &format!("single:{kind}"),
                &[source, ("parent", parent.clone()), ("child", child.clone())],
            ),
        }
    }
}

impl std::fmt::Display for FetchUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchUnit::Window { window } => write!(f, "window {window}"),
            FetchUnit::Day { day } => write!(f, "day {day}"),
            FetchUnit::Related { parent, child } => write!(f, "{parent}#{child}"),
        }
    }
}

/// A unit that failed after retries or on a fatal error
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    /// Unit that failed
    pub unit: FetchUnit,
    /// Last error observed
    pub error: CallError,
    /// Classification of the last error
    pub class: ErrorClass,
    /// Attempts made
    pub attempts: u32,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({}, {} attempt(s))",
            self.unit, self.error, self.class, self.attempts
        )
    }
}

/// Counters describing one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    /// Windows (or related items) processed
    pub windows: usize,
    /// Windows re-fetched day by day
    pub escalated_windows: usize,
    /// External call attempts, retries included
    pub live_calls: usize,
    /// Units served from cache
    pub cache_hits: usize,
    /// Retry attempts
    pub retries: usize,
    /// Records accepted before deduplication
    pub records_fetched: usize,
    /// Records left after deduplication
    pub records_kept: usize,
}

/// Outcome of a fetch run
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Record kind fetched
    pub kind: RecordKind,
    /// Deduplicated records, first-seen order
    pub records: Vec<ActivityRecord>,
    /// Units that could not be fetched
    pub failures: Vec<FetchFailure>,
    /// Whether the run stopped early on a cancellation request
    pub cancelled: bool,
    /// Run counters
    pub stats: FetchStats,
}

impl FetchResult {
    pub(crate) fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            records: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
            stats: FetchStats::default(),
        }
    }

    /// Whether some units failed or the run was cancelled
    pub fn is_partial(&self) -> bool {
        self.cancelled || !self.failures.is_empty()
    }

    /// Fold another phase of the same run into this result
    ///
    /// Failures are appended in order, cancellation is sticky and counters
    /// add up. The phase's records are dropped and `records_kept` is left
    /// to the caller.
    pub fn absorb(&mut self, phase: FetchResult) {
        self.failures.extend(phase.failures);
        self.cancelled |= phase.cancelled;

        let stats = &mut self.stats;
        stats.windows += phase.stats.windows;
        stats.escalated_windows += phase.stats.escalated_windows;
        stats.live_calls += phase.stats.live_calls;
        stats.cache_hits += phase.stats.cache_hits;
        stats.retries += phase.stats.retries;
        stats.records_fetched += phase.stats.records_fetched;
    }
}
