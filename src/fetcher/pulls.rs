//! Pull-request driven fetches
//!
//! Reviews, pull-request details and commits on unmerged branches cannot be
//! searched by date. They are reached through the pull requests found for
//! the range, with one related fetch per pull request, and every phase's
//! failures count towards the final result.

use crate::dedup::dedup_records;
use crate::fetcher::{AdaptiveFetchController, FetchError, FetchResult};
use crate::{ActivityRecord, PullRequest, RecordKind};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Whose reviews [`AdaptiveFetchController::fetch_reviews`] returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewSide {
    /// Reviews the user submitted, on pull requests they authored or reviewed
    #[default]
    Given,
    /// Reviews others submitted on the user's own pull requests
    Received,
}

impl AdaptiveFetchController {
    /// Fetch reviews submitted between `start` and `end` (inclusive)
    ///
    /// Lists the pull requests `identity` authored (and, for
    /// [`ReviewSide::Given`], the ones they reviewed) over the range, fetches
    /// the reviews of each, and keeps those submitted inside the range by
    /// `identity` (`Given`) or by anyone else (`Received`).
    ///
    /// # Errors
    /// Returns [`FetchError::InvalidRange`] before any call when `start > end`.
    pub async fn fetch_reviews(
        &self,
        identity: &str,
        start: NaiveDate,
        end: NaiveDate,
        side: ReviewSide,
    ) -> Result<FetchResult, FetchError> {
        let mut result = FetchResult::new(RecordKind::Review);

        let authored = self
            .fetch_range(RecordKind::PullRequest, identity, start, end)
            .await?;
        let mut pulls = authored.records.clone();
        result.absorb(authored);

        if side == ReviewSide::Given {
            let reviewed = self
                .fetch_range(RecordKind::ReviewedPullRequest, identity, start, end)
                .await?;
            pulls.extend(reviewed.records.iter().cloned());
            result.absorb(reviewed);
        }
        let targets = pull_request_targets(&pulls);
        info!(pull_requests = targets.len(), side = ?side, "Fetching reviews");

        let mut reviews = self
            .fetch_related_many(RecordKind::Review, &targets)
            .await;
        let fetched = std::mem::take(&mut reviews.records);
        result.absorb(reviews);

        let total = fetched.len();
        result.records = fetched
            .into_iter()
            .filter(|record| review_selected(record, identity, start, end, side))
            .collect();
        result.stats.records_kept = result.records.len();
        debug!(total, kept = result.records.len(), side = ?side, "Selected reviews");
        Ok(result)
    }

    /// Add commit and line counts to every pull request in `pulls`
    ///
    /// Pull requests whose details cannot be fetched keep their search fields;
    /// the failure is reported in the returned result.
    pub async fn fetch_pull_request_details(&self, mut pulls: FetchResult) -> FetchResult {
        let targets = pull_request_targets(&pulls.records);
        info!(pull_requests = targets.len(), "Fetching pull request details");

        let mut details = self
            .fetch_related_many(RecordKind::PullRequest, &targets)
            .await;
        let by_key: HashMap<(String, u64), PullRequest> = std::mem::take(&mut details.records)
            .into_iter()
            .filter_map(|record| match record {
                ActivityRecord::PullRequest(pr) => Some((pull_request_key(&pr)?, pr)),
                _ => None,
            })
            .collect();

        for record in &mut pulls.records {
            if let ActivityRecord::PullRequest(pr) = record {
                let Some(detail) = pull_request_key(pr).and_then(|key| by_key.get(&key)) else {
                    continue;
                };
                pr.commits = detail.commits;
                pr.additions = detail.additions;
                pr.deletions = detail.deletions;
            }
        }

        pulls.absorb(details);
        pulls
    }

    /// Fetch commits, adding those on the user's unmerged pull requests
    ///
    /// Commits on unmerged branches are missing from commit search. They are
    /// read from each unmerged pull request authored in the range and kept
    /// when `identity` authored them and they were committed inside the
    /// range. Search results come first; a SHA seen twice is kept once.
    ///
    /// # Errors
    /// Returns [`FetchError::InvalidRange`] before any call when `start > end`.
    pub async fn fetch_commits_with_pull_requests(
        &self,
        identity: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, FetchError> {
        let mut commits = self
            .fetch_range(RecordKind::Commit, identity, start, end)
            .await?;
        let pulls = self
            .fetch_range(RecordKind::PullRequest, identity, start, end)
            .await?;

        let unmerged: Vec<ActivityRecord> = pulls
            .records
            .iter()
            .filter(|record| matches!(record, ActivityRecord::PullRequest(pr) if pr.state != "merged"))
            .cloned()
            .collect();
        let targets = pull_request_targets(&unmerged);
        commits.absorb(pulls);
        info!(pull_requests = targets.len(), "Fetching commits of unmerged pull requests");

        let mut branches = self
            .fetch_related_many(RecordKind::Commit, &targets)
            .await;
        let extra: Vec<ActivityRecord> = std::mem::take(&mut branches.records)
            .into_iter()
            .filter(|record| commit_selected(record, identity, start, end))
            .collect();
        commits.absorb(branches);

        let added = extra.len();
        let mut records = std::mem::take(&mut commits.records);
        records.extend(extra);
        commits.records = dedup_records(records);
        commits.stats.records_kept = commits.records.len();
        debug!(added, kept = commits.records.len(), "Merged pull request commits");
        Ok(commits)
    }
}

/// `(repository, number)` of every pull request that has both, first seen first
pub fn pull_request_targets(records: &[ActivityRecord]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| match record {
            ActivityRecord::PullRequest(pr) => pull_request_key(pr),
            _ => None,
        })
        .filter(|key| seen.insert(key.clone()))
        .map(|(repository, number)| (repository, number.to_string()))
        .collect()
}

fn pull_request_key(pr: &PullRequest) -> Option<(String, u64)> {
    Some((pr.repository.clone()?, pr.number?))
}

fn in_range(at: Option<DateTime<Utc>>, start: NaiveDate, end: NaiveDate) -> bool {
    at.map(|at| (start..=end).contains(&at.date_naive()))
        .unwrap_or(false)
}

fn is_login(login: Option<&str>, identity: &str) -> bool {
    login.is_some_and(|login| login.eq_ignore_ascii_case(identity))
}

fn review_selected(
    record: &ActivityRecord,
    identity: &str,
    start: NaiveDate,
    end: NaiveDate,
    side: ReviewSide,
) -> bool {
    let ActivityRecord::Review(review) = record else {
        return false;
    };
    if !in_range(review.submitted_at, start, end) {
        return false;
    }
    let by_user = is_login(review.reviewer.as_deref(), identity);
    match side {
        ReviewSide::Given => by_user,
        ReviewSide::Received => !by_user,
    }
}

fn commit_selected(record: &ActivityRecord, identity: &str, start: NaiveDate, end: NaiveDate) -> bool {
    match record {
        ActivityRecord::Commit(commit) => {
            is_login(commit.author.as_deref(), identity) && in_range(commit.committed_at, start, end)
        }
        _ => false,
    }
}
