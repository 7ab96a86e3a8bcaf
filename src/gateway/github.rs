//! GitHub REST API gateway
//!
//! Issues one HTTP request per call and leaves retrying and pacing to the
//! fetch controller. Every failure is mapped to a classified [`CallError`];
//! rate-limit responses carry the reset hint from `retry-after` or
//! `x-ratelimit-reset`.
//!
//! The event feed is the exception: it is not addressable by date, so it is
//! read page by page (at most [`MAX_EVENT_PAGES`]) once per login and then
//! filtered to each window.

use crate::gateway::github_parser::GitHubParser;
use crate::gateway::{CallError, CallGateway};
use crate::{ActivityRecord, FetchWindow, RecordKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Public GitHub API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Items requested per page (the API maximum)
pub const PER_PAGE: u32 = 100;

/// Pages of the event feed the API serves (300 events)
pub const MAX_EVENT_PAGES: u32 = 3;

const API_VERSION: &str = "2022-11-28";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Gateway backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubGateway {
    client: Client,
    base_url: String,
    timeout: Duration,
    event_feeds: Arc<Mutex<HashMap<String, Arc<Vec<String>>>>>,
}

/// One response body and whether the server announced a next page
struct Page {
    body: String,
    has_next: bool,
}

impl GitHubGateway {
    /// Create a gateway for the public API
    ///
    /// # Arguments
    /// * `timeout` - Per-request timeout applied by the HTTP client
    /// * `token` - Optional bearer token, forwarded as-is
    pub fn new(timeout: Duration, token: Option<String>) -> Result<Self, CallError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("activity-fetcher/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| CallError::MalformedRequest("token contains invalid characters".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CallError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_API_URL.to_string(),
            timeout,
            event_feeds: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Point the gateway at another API root (GitHub Enterprise, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// API root in use
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String, CallError> {
        Ok(self.get_page(endpoint, params).await?.body)
    }

    async fn get_page(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Page, CallError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(url = %url, params = ?params, "GET");

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        if status.is_success() {
            let has_next = header_str(&headers, LINK.as_str())
                .map(has_next_link)
                .unwrap_or(false);
            return Ok(Page { body, has_next });
        }
        Err(classify_status(status, &headers, &body, Utc::now()))
    }

    /// Every page of the event feed of `login`, newest first
    ///
    /// The feed is read once per gateway; a failed read is not remembered.
    async fn event_feed(&self, login: &str) -> Result<Arc<Vec<String>>, CallError> {
        let mut feeds = self.event_feeds.lock().await;
        if let Some(pages) = feeds.get(login) {
            return Ok(pages.clone());
        }

        let endpoint = format!("/users/{login}/events");
        let mut pages = Vec::new();
        for page in 1..=MAX_EVENT_PAGES {
            let response = self
                .get_page(
                    &endpoint,
                    &[("per_page", PER_PAGE.to_string()), ("page", page.to_string())],
                )
                .await?;
            pages.push(response.body);
            if !response.has_next {
                break;
            }
        }
        debug!(login, pages = pages.len(), "Read event feed");

        let pages = Arc::new(pages);
        feeds.insert(login.to_string(), pages.clone());
        Ok(pages)
    }

    async fn search(&self, endpoint: &str, query: String) -> Result<String, CallError> {
        self.get(endpoint, &[("q", query), ("per_page", PER_PAGE.to_string())])
            .await
    }
}

#[async_trait]
impl CallGateway for GitHubGateway {
    async fn fetch_by_window(
        &self,
        kind: RecordKind,
        identity: &str,
        window: &FetchWindow,
    ) -> Result<Vec<ActivityRecord>, CallError> {
        validate_login(identity)?;
        let range = format!("{}..{}", window.start(), window.end());

        match kind {
            RecordKind::Commit => {
                let body = self
                    .search(
                        "/search/commits",
                        format!("author:{identity} committer-date:{range}"),
                    )
                    .await?;
                GitHubParser::parse_commit_search(&body)
            }
            RecordKind::PullRequest => {
                let body = self
                    .search(
                        "/search/issues",
                        format!("author:{identity} type:pr created:{range}"),
                    )
                    .await?;
                GitHubParser::parse_pull_request_search(&body)
            }
            RecordKind::ReviewedPullRequest => {
                let body = self
                    .search(
                        "/search/issues",
                        format!("reviewed-by:{identity} type:pr created:{range}"),
                    )
                    .await?;
                GitHubParser::parse_pull_request_search(&body)
            }
            RecordKind::Issue => {
                let body = self
                    .search(
                        "/search/issues",
                        format!("author:{identity} type:issue created:{range}"),
                    )
                    .await?;
                GitHubParser::parse_issue_search(&body)
            }
            RecordKind::Event => {
                let pages = self.event_feed(identity).await?;
                GitHubParser::parse_events(pages.as_slice(), window)
            }
            RecordKind::Review => Err(CallError::MalformedRequest(
                "reviews cannot be searched by date; fetch them per pull request".to_string(),
            )),
        }
    }

    async fn fetch_single(
        &self,
        kind: RecordKind,
        parent: &str,
        child: &str,
    ) -> Result<Vec<ActivityRecord>, CallError> {
        validate_repository(parent)?;
        let number: u64 = child.trim().parse().map_err(|_| {
            CallError::MalformedRequest(format!("pull request number must be numeric, got '{child}'"))
        })?;

        match kind {
            RecordKind::Review => {
                let body = self
                    .get(
                        &format!("/repos/{parent}/pulls/{number}/reviews"),
                        &[("per_page", PER_PAGE.to_string())],
                    )
                    .await?;
                GitHubParser::parse_reviews(&body, parent, number)
            }
            RecordKind::PullRequest => {
                let body = self
                    .get(&format!("/repos/{parent}/pulls/{number}"), &[])
                    .await?;
                GitHubParser::parse_pull_request_detail(&body, parent)
            }
            RecordKind::Commit => {
                let body = self
                    .get(
                        &format!("/repos/{parent}/pulls/{number}/commits"),
                        &[("per_page", PER_PAGE.to_string())],
                    )
                    .await?;
                GitHubParser::parse_pull_request_commits(&body, parent, number)
            }
            RecordKind::Issue | RecordKind::Event | RecordKind::ReviewedPullRequest => {
                Err(CallError::MalformedRequest(format!(
                    "{kind} records are not fetched per pull request"
                )))
            }
        }
    }

    fn source(&self) -> &str {
        &self.base_url
    }
}

/// Map a non-success HTTP status to a classified error
///
/// # Arguments
/// * `status` - Response status
/// * `headers` - Response headers, consulted for rate-limit hints
/// * `body` - Response body, truncated into the error message
/// * `now` - Current time, used to turn `x-ratelimit-reset` into a wait
pub fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> CallError {
    let message = error_message(status, body);
    let code = status.as_u16();

    let exhausted = header_str(headers, "x-ratelimit-remaining")
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    let secondary_limit = body.to_ascii_lowercase().contains("rate limit");

    if code == 429 || (code == 403 && (exhausted || secondary_limit)) {
        return CallError::RateLimited {
            retry_after: rate_limit_hint(headers, now),
            message,
        };
    }

    match code {
        401 | 403 => CallError::Unauthorized {
            status: code,
            message,
        },
        _ if status.is_server_error() => CallError::Server {
            status: code,
            message,
        },
        _ => CallError::MalformedRequest(format!("{code}: {message}")),
    }
}

/// Wait suggested by the server before the rate limit resets
///
/// `retry-after` (seconds) takes precedence over `x-ratelimit-reset` (epoch
/// seconds). A reset time in the past yields a zero wait.
pub fn rate_limit_hint(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(secs) = header_str(headers, "retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    let reset = header_str(headers, "x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    let wait = reset - now.timestamp();
    Some(Duration::from_secs(wait.max(0) as u64))
}

/// Map a transport-level failure to a classified error
pub fn classify_transport(err: reqwest::Error, timeout: Duration) -> CallError {
    if err.is_timeout() {
        return CallError::Timeout(timeout);
    }
    if err.is_decode() {
        return CallError::MalformedResponse(err.to_string());
    }
    if err.is_builder() {
        return CallError::MalformedRequest(err.to_string());
    }
    CallError::Network(err.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Whether a `Link` header value carries a `rel="next"` entry
fn has_next_link(link: &str) -> bool {
    link.split(',').any(|entry| {
        entry
            .split(';')
            .skip(1)
            .any(|param| matches!(param.trim(), r#"rel="next""# | "rel=next"))
    })
}

fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));

    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        None => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

fn validate_login(login: &str) -> Result<(), CallError> {
    let valid = !login.is_empty()
        && login.len() <= 39
        && login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !login.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(CallError::MalformedRequest(format!("invalid GitHub login '{login}'")))
    }
}

fn validate_repository(repository: &str) -> Result<(), CallError> {
    let valid_part = |s: &str| {
        !s.is_empty()
            && s != "."
            && s != ".."
            && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c))
    };
    match repository.split_once('/') {
        Some((owner, name)) if valid_part(owner) && valid_part(name) => Ok(()),
        _ => Err(CallError::MalformedRequest(format!(
            "repository must be 'owner/name', got '{repository}'"
        ))),
    }
}
