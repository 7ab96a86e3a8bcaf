//! GitHub response parser
//!
//! Stateless conversion of GitHub REST API JSON bodies into
//! [`ActivityRecord`] values. Unknown fields are ignored and missing optional
//! fields become `None`, so partially populated items still produce records.

use crate::gateway::CallError;
use crate::{ActivityRecord, Commit, Event, FetchWindow, Issue, PullRequest, Review};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SearchPage<T> {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommitItem {
    sha: Option<String>,
    html_url: Option<String>,
    commit: CommitDetail,
    author: Option<UserRef>,
    repository: Option<RepositoryRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommitDetail {
    message: String,
    author: Option<Signature>,
    committer: Option<Signature>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Signature {
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RepositoryRef {
    full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IssueItem {
    number: Option<u64>,
    title: String,
    state: String,
    html_url: Option<String>,
    repository_url: Option<String>,
    created_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    labels: Vec<LabelRef>,
    pull_request: Option<PullRequestRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LabelRef {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PullRequestRef {
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventItem {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    repo: Option<EventRepo>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventRepo {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReviewItem {
    id: Option<u64>,
    user: Option<UserRef>,
    state: String,
    body: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserRef {
    login: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PullRequestDetail {
    number: Option<u64>,
    title: String,
    state: String,
    html_url: Option<String>,
    created_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    commits: Option<u64>,
    additions: Option<u64>,
    deletions: Option<u64>,
}

/// Stateless parser for GitHub API responses
pub struct GitHubParser;

impl GitHubParser {
    /// Parse a `/search/commits` page
    pub fn parse_commit_search(body: &str) -> Result<Vec<ActivityRecord>, CallError> {
        let page: SearchPage<CommitItem> = decode(body, "commit search")?;
        log_truncation("commits", &page);
        Ok(page
            .items
            .into_iter()
            .map(|item| {
                let repository = item.repository.as_ref().and_then(|r| r.full_name.clone());
                ActivityRecord::Commit(commit_from_item(item, repository))
            })
            .collect())
    }

    /// Parse a `/search/issues` page filtered to pull requests
    pub fn parse_pull_request_search(body: &str) -> Result<Vec<ActivityRecord>, CallError> {
        let page: SearchPage<IssueItem> = decode(body, "pull request search")?;
        log_truncation("pull requests", &page);
        Ok(page
            .items
            .into_iter()
            .map(|item| {
                let merged_at = item.pull_request.and_then(|pr| pr.merged_at);
                let state = if merged_at.is_some() {
                    "merged".to_string()
                } else {
                    item.state
                };
                ActivityRecord::PullRequest(PullRequest {
                    repository: item.repository_url.as_deref().and_then(repository_from_url),
                    number: item.number,
                    title: item.title,
                    state,
                    created_at: item.created_at,
                    merged_at,
                    closed_at: item.closed_at,
                    url: item.html_url,
                    ..Default::default()
                })
            })
            .collect())
    }

    /// Parse a `/search/issues` page filtered to issues
    pub fn parse_issue_search(body: &str) -> Result<Vec<ActivityRecord>, CallError> {
        let page: SearchPage<IssueItem> = decode(body, "issue search")?;
        log_truncation("issues", &page);
        Ok(page
            .items
            .into_iter()
            .map(|item| {
                ActivityRecord::Issue(Issue {
                    repository: item.repository_url.as_deref().and_then(repository_from_url),
                    number: item.number,
                    title: item.title,
                    state: item.state,
                    created_at: item.created_at,
                    closed_at: item.closed_at,
                    url: item.html_url,
                    labels: item.labels.into_iter().map(|l| l.name).collect(),
                })
            })
            .collect())
    }

    /// Parse `/users/<login>/events` pages, keeping events inside `window`
    pub fn parse_events<S: AsRef<str>>(
        pages: &[S],
        window: &FetchWindow,
    ) -> Result<Vec<ActivityRecord>, CallError> {
        let mut items: Vec<EventItem> = Vec::new();
        for page in pages {
            items.extend(decode::<Vec<EventItem>>(page.as_ref(), "events")?);
        }
        let total = items.len();
        let records: Vec<ActivityRecord> = items
            .into_iter()
            .filter(|item| {
                item.created_at
                    .map(|at| window.contains(at.date_naive()))
                    .unwrap_or(false)
            })
            .map(|item| {
                ActivityRecord::Event(Event {
                    id: item.id,
                    event_type: item.event_type,
                    repository: item.repo.and_then(|r| r.name),
                    created_at: item.created_at,
                })
            })
            .collect();
        debug!(total, kept = records.len(), window = %window, "Filtered events to window");
        Ok(records)
    }

    /// Parse `/repos/<repo>/pulls/<n>/reviews`
    pub fn parse_reviews(
        body: &str,
        repository: &str,
        pull_request: u64,
    ) -> Result<Vec<ActivityRecord>, CallError> {
        let items: Vec<ReviewItem> = decode(body, "reviews")?;
        Ok(items
            .into_iter()
            .map(|item| {
                ActivityRecord::Review(Review {
                    id: item.id,
                    repository: Some(repository.to_string()),
                    pull_request: Some(pull_request),
                    reviewer: item.user.and_then(|u| u.login),
                    state: item.state,
                    submitted_at: item.submitted_at,
                    body_length: item.body.map(|b| b.chars().count()).unwrap_or(0),
                })
            })
            .collect())
    }

    /// Parse `/repos/<repo>/pulls/<n>` into a single detailed pull request
    pub fn parse_pull_request_detail(
        body: &str,
        repository: &str,
    ) -> Result<Vec<ActivityRecord>, CallError> {
        let detail: PullRequestDetail = decode(body, "pull request")?;
        let state = if detail.merged_at.is_some() {
            "merged".to_string()
        } else {
            detail.state
        };
        Ok(vec![ActivityRecord::PullRequest(PullRequest {
            repository: Some(repository.to_string()),
            number: detail.number,
            title: detail.title,
            state,
            created_at: detail.created_at,
            merged_at: detail.merged_at,
            closed_at: detail.closed_at,
            url: detail.html_url,
            commits: detail.commits,
            additions: detail.additions,
            deletions: detail.deletions,
        })])
    }

    /// Parse `/repos/<repo>/pulls/<n>/commits`
    pub fn parse_pull_request_commits(
        body: &str,
        repository: &str,
        pull_request: u64,
    ) -> Result<Vec<ActivityRecord>, CallError> {
        let items: Vec<CommitItem> = decode(body, "pull request commits")?;
        Ok(items
            .into_iter()
            .map(|item| {
                let mut commit = commit_from_item(item, Some(repository.to_string()));
                commit.from_pull_request = Some(pull_request);
                ActivityRecord::Commit(commit)
            })
            .collect())
    }
}

/// `https://api.github.com/repos/owner/name` -> `owner/name`
pub fn repository_from_url(url: &str) -> Option<String> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    let name = segments.next().filter(|s| !s.is_empty())?;
    let owner = segments.next().filter(|s| !s.is_empty())?;
    Some(format!("{owner}/{name}"))
}

fn commit_from_item(item: CommitItem, repository: Option<String>) -> Commit {
    Commit {
        sha: item.sha,
        repository,
        message: item.commit.message,
        committed_at: item.commit.committer.and_then(|s| s.date),
        authored_at: item.commit.author.and_then(|s| s.date),
        url: item.html_url,
        author: item.author.and_then(|u| u.login),
        from_pull_request: None,
    }
}

fn decode<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, CallError> {
    serde_json::from_str(body)
        .map_err(|e| CallError::MalformedResponse(format!("Failed to parse {what} response: {e}")))
}

fn log_truncation<T>(what: &str, page: &SearchPage<T>) {
    if page.incomplete_results || page.total_count > page.items.len() as u64 {
        debug!(
            what,
            total_count = page.total_count,
            returned = page.items.len(),
            incomplete = page.incomplete_results,
            "Search page does not hold every match"
        );
    }
}
