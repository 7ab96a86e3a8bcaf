//! # Activity Fetcher Library
//!
//! Fetches a user's activity history (commits, pull requests, issues, reviews
//! and events) from a paginated, rate-limited API over an arbitrary date range,
//! completely, even though the API returns at most a bounded number of records
//! per request.
//!
//! ## Features
//!
//! - **Adaptive granularity**: ranges are fetched week by week; a week whose
//!   record count reaches the high-activity threshold is re-fetched day by day
//! - **Response cache**: deterministic, TTL-bound, atomically written, can be disabled
//! - **Retry with backoff**: transient failures are retried, fatal ones are not,
//!   rate limits honour the server's reset hint
//! - **Partial results**: windows that keep failing are reported, not fatal
//! - **Deduplication**: per record kind identity, first occurrence wins
//!
//! ## Quick Start
//!
//! ```no_run
//! use activity_fetcher::config::FetchConfig;
//! use activity_fetcher::fetcher::AdaptiveFetchController;
//! use activity_fetcher::gateway::github::GitHubGateway;
//! use activity_fetcher::RecordKind;
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetchConfig::default();
//! let gateway = GitHubGateway::new(config.call_timeout, std::env::var("GITHUB_TOKEN").ok())?;
//! let controller = AdaptiveFetchController::new(Arc::new(gateway), config)?;
//!
//! let result = controller
//!     .fetch_range(
//!         RecordKind::Commit,
//!         "octocat",
//!         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
//!     )
//!     .await?;
//!
//! println!("{} commits, partial: {}", result.records.len(), result.is_partial());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`window`] - Splits a date range into windows of at most seven days
//! - [`cache`] - Response cache keyed by request signature
//! - [`retry`] - Retry policy and error classification
//! - [`fetcher`] - The adaptive fetch controller
//! - [`dedup`] - Identity extraction and deduplication
//! - [`gateway`] - Call gateway trait and the GitHub HTTP implementation
//! - [`filter`] - Repository include/exclude patterns
//! - [`output`] - JSON lines and CSV writers
//!
//! ## Record Types
//!
//! - [`Commit`] - identified by SHA
//! - [`PullRequest`] - identified by repository and number
//! - [`Issue`] - identified by repository and number
//! - [`Review`] - identified by review id
//! - [`Event`] - identified by event id

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Response cache
pub mod cache;

/// Cooperative cancellation
pub mod cancel;

/// CLI command implementations
pub mod cli;

/// Clock and sleep abstractions
pub mod clock;

/// Fetch and cache configuration
pub mod config;

/// Record identity and deduplication
pub mod dedup;

/// Adaptive fetch orchestration
pub mod fetcher;

/// Repository filtering
pub mod filter;

/// Call gateways
pub mod gateway;

/// Operational metrics
pub mod metrics;

/// Record output writers
pub mod output;

/// Retry policy
pub mod retry;

/// Fetch windows and calendar periods
pub mod window;

// Re-export commonly used types
pub use window::{FetchWindow, Period, Segmenter};

/// Kind of activity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Authored commits
    Commit,
    /// Authored pull requests
    PullRequest,
    /// Authored issues
    Issue,
    /// Pull request reviews
    Review,
    /// Public timeline events
    Event,
    /// Pull requests the user reviewed, searched by creation date
    ReviewedPullRequest,
}

impl RecordKind {
    /// All record kinds in a stable order
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Commit,
        RecordKind::PullRequest,
        RecordKind::Issue,
        RecordKind::Review,
        RecordKind::Event,
        RecordKind::ReviewedPullRequest,
    ];

    /// Stable snake_case name, used in cache keys and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Commit => "commit",
            RecordKind::PullRequest => "pull_request",
            RecordKind::Issue => "issue",
            RecordKind::Review => "review",
            RecordKind::Event => "event",
            RecordKind::ReviewedPullRequest => "reviewed_pull_request",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "commit" | "commits" => Ok(RecordKind::Commit),
            "pull_request" | "pull_requests" | "pr" | "prs" => Ok(RecordKind::PullRequest),
            "issue" | "issues" => Ok(RecordKind::Issue),
            "review" | "reviews" => Ok(RecordKind::Review),
            "event" | "events" => Ok(RecordKind::Event),
            "reviewed_pull_request" | "reviewed_pull_requests" | "reviewed_prs" => {
                Ok(RecordKind::ReviewedPullRequest)
            }
            _ => Err(format!(
                "Invalid record kind: {s}. Valid options: commits, pull-requests, issues, reviews, events, reviewed-pull-requests"
            )),
        }
    }
}

/// An authored commit
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Commit {
    /// Commit SHA
    pub sha: Option<String>,
    /// Repository full name (owner/name)
    pub repository: Option<String>,
    /// Commit message
    pub message: String,
    /// Committer date
    pub committed_at: Option<DateTime<Utc>>,
    /// Author date
    pub authored_at: Option<DateTime<Utc>>,
    /// Web URL
    pub url: Option<String>,
    /// Login of the linked GitHub author, when the API reports one
    pub author: Option<String>,
    /// Pull request number this commit was discovered through, if any
    pub from_pull_request: Option<u64>,
}

/// An authored pull request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PullRequest {
    /// Repository full name (owner/name)
    pub repository: Option<String>,
    /// Pull request number within the repository
    pub number: Option<u64>,
    /// Title
    pub title: String,
    /// State: open, closed or merged
    pub state: String,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Merge time
    pub merged_at: Option<DateTime<Utc>>,
    /// Close time
    pub closed_at: Option<DateTime<Utc>>,
    /// Web URL
    pub url: Option<String>,
    /// Number of commits, when details were fetched
    pub commits: Option<u64>,
    /// Lines added, when details were fetched
    pub additions: Option<u64>,
    /// Lines deleted, when details were fetched
    pub deletions: Option<u64>,
}

/// An authored issue
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Issue {
    /// Repository full name (owner/name)
    pub repository: Option<String>,
    /// Issue number within the repository
    pub number: Option<u64>,
    /// Title
    pub title: String,
    /// State: open or closed
    pub state: String,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Close time
    pub closed_at: Option<DateTime<Utc>>,
    /// Web URL
    pub url: Option<String>,
    /// Label names
    pub labels: Vec<String>,
}

/// A pull request review
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Review {
    /// Server-assigned review id
    pub id: Option<u64>,
    /// Repository full name (owner/name)
    pub repository: Option<String>,
    /// Reviewed pull request number
    pub pull_request: Option<u64>,
    /// Reviewer login
    pub reviewer: Option<String>,
    /// Review state (APPROVED, CHANGES_REQUESTED, COMMENTED, ...)
    pub state: String,
    /// Submission time
    pub submitted_at: Option<DateTime<Utc>>,
    /// Length of the review body in characters
    pub body_length: usize,
}

/// A public timeline event
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Event {
    /// Server-assigned event id
    pub id: Option<String>,
    /// Event type (PushEvent, PullRequestEvent, ...)
    pub event_type: String,
    /// Repository full name (owner/name)
    pub repository: Option<String>,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
}

/// A fetched activity record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityRecord {
    /// Commit record
    Commit(Commit),
    /// Pull request record
    PullRequest(PullRequest),
    /// Issue record
    Issue(Issue),
    /// Review record
    Review(Review),
    /// Event record
    Event(Event),
}

impl ActivityRecord {
    /// Kind of this record
    pub fn kind(&self) -> RecordKind {
        match self {
            ActivityRecord::Commit(_) => RecordKind::Commit,
            ActivityRecord::PullRequest(_) => RecordKind::PullRequest,
            ActivityRecord::Issue(_) => RecordKind::Issue,
            ActivityRecord::Review(_) => RecordKind::Review,
            ActivityRecord::Event(_) => RecordKind::Event,
        }
    }

    /// When the activity happened, if known
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ActivityRecord::Commit(c) => c.committed_at.or(c.authored_at),
            ActivityRecord::PullRequest(p) => p.created_at,
            ActivityRecord::Issue(i) => i.created_at,
            ActivityRecord::Review(r) => r.submitted_at,
            ActivityRecord::Event(e) => e.created_at,
        }
    }

    /// Repository the activity belongs to, if known
    pub fn repository(&self) -> Option<&str> {
        match self {
            ActivityRecord::Commit(c) => c.repository.as_deref(),
            ActivityRecord::PullRequest(p) => p.repository.as_deref(),
            ActivityRecord::Issue(i) => i.repository.as_deref(),
            ActivityRecord::Review(r) => r.repository.as_deref(),
            ActivityRecord::Event(e) => e.repository.as_deref(),
        }
    }

    /// Short human-readable summary (first message line, title, state or type)
    pub fn summary(&self) -> &str {
        match self {
            ActivityRecord::Commit(c) => c.message.lines().next().unwrap_or(""),
            ActivityRecord::PullRequest(p) => &p.title,
            ActivityRecord::Issue(i) => &i.title,
            ActivityRecord::Review(r) => &r.state,
            ActivityRecord::Event(e) => &e.event_type,
        }
    }

    /// Web URL, if known
    pub fn url(&self) -> Option<&str> {
        match self {
            ActivityRecord::Commit(c) => c.url.as_deref(),
            ActivityRecord::PullRequest(p) => p.url.as_deref(),
            ActivityRecord::Issue(i) => i.url.as_deref(),
            ActivityRecord::Review(_) | ActivityRecord::Event(_) => None,
        }
    }
}
