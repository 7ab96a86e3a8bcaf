//! Integration tests for per-item fetches: reviews, pull request details and
//! commits on pull request branches

use std::sync::Arc;
use std::time::Duration;

use activity_fetcher::cache::{MemoryCache, ResponseCache};
use activity_fetcher::clock::RecordingSleeper;
use activity_fetcher::config::FetchConfig;
use activity_fetcher::fetcher::{AdaptiveFetchController, ReviewSide};
use activity_fetcher::gateway::CallError;
use activity_fetcher::{ActivityRecord, Commit, PullRequest, RecordKind, Review};
use chrono::{NaiveDate, TimeZone, Utc};

use crate::support::{commit, date, server_error, shas, FakeCall, FakeGateway};

fn review(id: u64, repo: &str, pr: u64) -> ActivityRecord {
    ActivityRecord::Review(Review {
        id: Some(id),
        repository: Some(repo.to_string()),
        pull_request: Some(pr),
        reviewer: Some("hubot".to_string()),
        state: "APPROVED".to_string(),
        ..Default::default()
    })
}

fn review_gateway() -> Arc<FakeGateway> {
    FakeGateway::new(|call| match call {
        FakeCall::Single { parent, child, .. } => match (parent.as_str(), child.as_str()) {
            ("octo/a", "7") => Ok(vec![review(1, "octo/a", 7), review(2, "octo/a", 7)]),
            ("octo/b", "9") => Ok(vec![review(3, "octo/b", 9), review(1, "octo/a", 7)]),
            _ => Err(CallError::MalformedRequest("not found".to_string())),
        },
        FakeCall::Window { .. } => Err(CallError::MalformedRequest("by window".to_string())),
    })
}

fn controller(gateway: Arc<FakeGateway>) -> AdaptiveFetchController {
    let config = FetchConfig::default().with_request_delay(Duration::ZERO);
    AdaptiveFetchController::new(gateway, config)
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::new()))
}

#[tokio::test]
async fn test_related_fetch_unions_and_dedups() {
    let gateway = review_gateway();
    let result = controller(gateway.clone())
        .fetch_related_many(RecordKind::Review, &[("octo/a", "7"), ("octo/b", "9")])
        .await;

    assert_eq!(gateway.call_count(), 2);
    assert!(!result.is_partial());
    let ids: Vec<_> = result
        .records
        .iter()
        .map(|r| match r {
            ActivityRecord::Review(review) => review.id.unwrap(),
            other => panic!("unexpected record: {other:?}"),
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_related_failure_is_recorded_per_item() {
    let gateway = review_gateway();
    let result = controller(gateway.clone())
        .fetch_related_many(RecordKind::Review, &[("octo/a", "7"), ("octo/missing", "1")])
        .await;

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].unit.to_string(), "octo/missing#1");
}

#[tokio::test]
async fn test_related_fetch_uses_cache() {
    let gateway = review_gateway();
    let cache: Arc<dyn ResponseCache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
    let controller = controller(gateway.clone()).with_cache(cache);

    controller.fetch_related(RecordKind::Review, "octo/a", "7").await;
    let second = controller.fetch_related(RecordKind::Review, "octo/a", "7").await;

    assert_eq!(gateway.call_count(), 1);
    assert_eq!(second.stats.cache_hits, 1);
    assert_eq!(second.records.len(), 2);
}

fn pull(repo: &str, number: u64, state: &str) -> ActivityRecord {
    ActivityRecord::PullRequest(PullRequest {
        repository: Some(repo.to_string()),
        number: Some(number),
        title: format!("{repo}#{number}"),
        state: state.to_string(),
        ..Default::default()
    })
}

fn submitted(id: u64, repo: &str, pr: u64, reviewer: &str, day: NaiveDate) -> ActivityRecord {
    ActivityRecord::Review(Review {
        id: Some(id),
        repository: Some(repo.to_string()),
        pull_request: Some(pr),
        reviewer: Some(reviewer.to_string()),
        state: "COMMENTED".to_string(),
        submitted_at: Some(Utc.from_utc_datetime(&day.and_hms_opt(9, 0, 0).unwrap())),
        ..Default::default()
    })
}

fn review_ids(records: &[ActivityRecord]) -> Vec<u64> {
    records
        .iter()
        .filter_map(|r| match r {
            ActivityRecord::Review(review) => review.id,
            _ => None,
        })
        .collect()
}

/// octocat authored octo/own#1; they reviewed hubot/tool#5 in January
fn activity_gateway() -> Arc<FakeGateway> {
    FakeGateway::new(|call| match call {
        FakeCall::Window {
            kind: RecordKind::PullRequest,
            start,
            ..
        } if *start == date(2024, 1, 1) => Ok(vec![pull("octo/own", 1, "open")]),
        FakeCall::Window {
            kind: RecordKind::ReviewedPullRequest,
            start,
            ..
        } if *start == date(2024, 1, 8) => Ok(vec![pull("hubot/tool", 5, "merged")]),
        FakeCall::Window { .. } => Ok(Vec::new()),
        FakeCall::Single {
            kind: RecordKind::Review,
            parent,
            child,
        } => match (parent.as_str(), child.as_str()) {
            ("octo/own", "1") => Ok(vec![
                submitted(10, "octo/own", 1, "hubot", date(2024, 1, 3)),
                submitted(11, "octo/own", 1, "octocat", date(2024, 1, 4)),
                submitted(12, "octo/own", 1, "monalisa", date(2024, 2, 2)),
            ]),
            ("hubot/tool", "5") => Ok(vec![
                submitted(20, "hubot/tool", 5, "OctoCat", date(2024, 1, 9)),
                submitted(21, "hubot/tool", 5, "hubot", date(2024, 1, 9)),
                submitted(22, "hubot/tool", 5, "octocat", date(2023, 12, 30)),
            ]),
            _ => Err(CallError::MalformedRequest("not found".to_string())),
        },
        FakeCall::Single { .. } => Err(CallError::MalformedRequest("unexpected".to_string())),
    })
}

#[tokio::test]
async fn test_given_reviews_cover_authored_and_reviewed_pull_requests() {
    let gateway = activity_gateway();
    let result = controller(gateway.clone())
        .fetch_reviews("octocat", date(2024, 1, 1), date(2024, 1, 31), ReviewSide::Given)
        .await
        .unwrap();

    assert!(!result.is_partial());
    assert_eq!(result.kind, RecordKind::Review);
    // Only octocat's own reviews submitted in January
    assert_eq!(review_ids(&result.records), vec![11, 20]);

    let searched: Vec<RecordKind> = gateway
        .calls()
        .iter()
        .filter_map(|call| match call {
            FakeCall::Window { kind, .. } => Some(*kind),
            FakeCall::Single { .. } => None,
        })
        .collect();
    assert_eq!(searched.len(), 10);
    assert_eq!(
        searched.iter().filter(|k| **k == RecordKind::ReviewedPullRequest).count(),
        5
    );
}

#[tokio::test]
async fn test_received_reviews_come_from_others_on_authored_pull_requests() {
    let gateway = activity_gateway();
    let result = controller(gateway.clone())
        .fetch_reviews("octocat", date(2024, 1, 1), date(2024, 1, 31), ReviewSide::Received)
        .await
        .unwrap();

    assert_eq!(review_ids(&result.records), vec![10]);
    assert!(gateway.calls().iter().all(|call| !matches!(
        call,
        FakeCall::Window {
            kind: RecordKind::ReviewedPullRequest,
            ..
        }
    )));
}

#[tokio::test]
async fn test_review_phase_failures_make_result_partial() {
    let gateway = activity_gateway();
    // First pull request search window fails for good
    gateway.queue_errors(vec![server_error(); 4]);

    let result = controller(gateway.clone())
        .fetch_reviews("octocat", date(2024, 1, 1), date(2024, 1, 31), ReviewSide::Given)
        .await
        .unwrap();

    assert!(result.is_partial());
    assert_eq!(result.failures.len(), 1);
    assert_eq!(review_ids(&result.records), vec![20]);
}

#[tokio::test]
async fn test_pull_request_details_fill_counts() {
    let gateway = FakeGateway::new(|call| match call {
        FakeCall::Window { start, .. } if *start == date(2024, 1, 1) => Ok(vec![
            pull("octo/a", 1, "merged"),
            pull("octo/a", 2, "open"),
        ]),
        FakeCall::Window { .. } => Ok(Vec::new()),
        FakeCall::Single {
            kind: RecordKind::PullRequest,
            parent,
            child,
        } if child == "1" => Ok(vec![ActivityRecord::PullRequest(PullRequest {
            repository: Some(parent.clone()),
            number: Some(1),
            commits: Some(3),
            additions: Some(40),
            deletions: Some(2),
            ..Default::default()
        })]),
        FakeCall::Single { .. } => Err(CallError::MalformedRequest("gone".to_string())),
    });
    let controller = controller(gateway.clone());

    let pulls = controller
        .fetch_range(RecordKind::PullRequest, "octocat", date(2024, 1, 1), date(2024, 1, 7))
        .await
        .unwrap();
    let result = controller.fetch_pull_request_details(pulls).await;

    assert_eq!(result.records.len(), 2);
    match &result.records[0] {
        ActivityRecord::PullRequest(pr) => {
            assert_eq!(pr.title, "octo/a#1");
            assert_eq!(pr.state, "merged");
            assert_eq!((pr.commits, pr.additions, pr.deletions), (Some(3), Some(40), Some(2)));
        }
        other => panic!("unexpected record: {other:?}"),
    }
    match &result.records[1] {
        ActivityRecord::PullRequest(pr) => assert_eq!(pr.commits, None),
        other => panic!("unexpected record: {other:?}"),
    }
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].unit.to_string(), "octo/a#2");
}

fn branch_commit(sha: &str, author: &str, day: NaiveDate, pr: u64) -> ActivityRecord {
    match commit(sha, day) {
        ActivityRecord::Commit(c) => ActivityRecord::Commit(Commit {
            author: Some(author.to_string()),
            from_pull_request: Some(pr),
            ..c
        }),
        other => other,
    }
}

#[tokio::test]
async fn test_commits_from_unmerged_pull_requests_are_merged_in() {
    let gateway = FakeGateway::new(|call| match call {
        FakeCall::Window {
            kind: RecordKind::Commit,
            start,
            ..
        } if *start == date(2024, 1, 1) => Ok(vec![commit("s1", date(2024, 1, 2))]),
        FakeCall::Window {
            kind: RecordKind::PullRequest,
            start,
            ..
        } if *start == date(2024, 1, 1) => Ok(vec![
            pull("octo/repo", 3, "open"),
            pull("octo/repo", 4, "merged"),
        ]),
        FakeCall::Window { .. } => Ok(Vec::new()),
        FakeCall::Single {
            kind: RecordKind::Commit,
            child,
            ..
        } if child == "3" => Ok(vec![
            branch_commit("s1", "octocat", date(2024, 1, 2), 3),
            branch_commit("b1", "octocat", date(2024, 1, 5), 3),
            branch_commit("b2", "hubot", date(2024, 1, 5), 3),
            branch_commit("b3", "octocat", date(2023, 12, 1), 3),
        ]),
        FakeCall::Single { .. } => Err(CallError::MalformedRequest("unexpected".to_string())),
    });

    let result = controller(gateway.clone())
        .fetch_commits_with_pull_requests("octocat", date(2024, 1, 1), date(2024, 1, 14))
        .await
        .unwrap();

    assert!(!result.is_partial());
    assert_eq!(shas(&result.records), vec!["s1", "b1"]);
    // Search copy of s1 wins
    match &result.records[0] {
        ActivityRecord::Commit(c) => assert_eq!(c.from_pull_request, None),
        other => panic!("unexpected record: {other:?}"),
    }
    // Only the unmerged pull request is read
    let singles: Vec<_> = gateway
        .calls()
        .into_iter()
        .filter(|call| matches!(call, FakeCall::Single { .. }))
        .collect();
    assert_eq!(
        singles,
        vec![FakeCall::Single {
            kind: RecordKind::Commit,
            parent: "octo/repo".to_string(),
            child: "3".to_string(),
        }]
    );
}
