//! Integration tests for window segmentation, escalation and deduplication

use std::sync::Arc;
use std::time::Duration;

use activity_fetcher::clock::RecordingSleeper;
use activity_fetcher::config::FetchConfig;
use activity_fetcher::fetcher::{AdaptiveFetchController, FetchError};
use activity_fetcher::gateway::CallError;
use activity_fetcher::{ActivityRecord, RecordKind};

use crate::support::{commit, commits, date, shas, FakeCall, FakeGateway};

fn controller(gateway: Arc<FakeGateway>, sleeper: Arc<RecordingSleeper>) -> AdaptiveFetchController {
    let config = FetchConfig::default().with_request_delay(Duration::from_secs(1));
    AdaptiveFetchController::new(gateway, config)
        .unwrap()
        .with_sleeper(sleeper)
}

#[tokio::test]
async fn test_month_is_fetched_in_five_windows() {
    let gateway = FakeGateway::empty();
    let sleeper = Arc::new(RecordingSleeper::new());
    let controller = controller(gateway.clone(), sleeper.clone());

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 1), date(2024, 1, 31))
        .await
        .unwrap();

    let windows: Vec<_> = gateway.calls().iter().filter_map(FakeCall::window).collect();
    assert_eq!(
        windows,
        vec![
            (date(2024, 1, 1), date(2024, 1, 7)),
            (date(2024, 1, 8), date(2024, 1, 14)),
            (date(2024, 1, 15), date(2024, 1, 21)),
            (date(2024, 1, 22), date(2024, 1, 28)),
            (date(2024, 1, 29), date(2024, 1, 31)),
        ]
    );
    assert!(result.records.is_empty());
    assert!(!result.is_partial());
    assert_eq!(result.stats.windows, 5);
    assert_eq!(result.stats.live_calls, 5);
    // One pause after every live call
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(1); 5]);
}

#[tokio::test]
async fn test_busy_week_is_refetched_day_by_day() {
    let busy_start = date(2024, 1, 8);
    let busy_end = date(2024, 1, 14);

    let gateway = FakeGateway::new(move |call| {
        let (start, end) = call.window().expect("window call");
        if (start, end) == (busy_start, busy_end) {
            return Ok(commits("busy", 120, start));
        }
        if start == end && start >= busy_start && start <= busy_end {
            let mut day = commits(&format!("d{start}"), 3, start);
            day.push(commit("shared", start));
            return Ok(day);
        }
        Ok(commits(&format!("w{start}"), 2, start))
    });
    let sleeper = Arc::new(RecordingSleeper::new());
    let controller = controller(gateway.clone(), sleeper.clone());

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 1), date(2024, 1, 21))
        .await
        .unwrap();

    // 3 windows + 7 day calls for the busy week
    let calls = gateway.calls();
    assert_eq!(calls.len(), 10);
    let days: Vec<_> = calls[2..9].iter().filter_map(FakeCall::window).collect();
    assert!(days.iter().all(|(s, e)| s == e));
    assert_eq!(days.first().unwrap().0, busy_start);
    assert_eq!(days.last().unwrap().0, busy_end);
    assert_eq!(calls[9].window(), Some((date(2024, 1, 15), date(2024, 1, 21))));

    // Window result of the busy week is discarded
    let kept = shas(&result.records);
    assert!(!kept.iter().any(|sha| sha.starts_with("busy")));
    assert_eq!(kept.iter().filter(|sha| *sha == "shared").count(), 1);
    assert_eq!(result.stats.records_fetched, 2 + 7 * 4 + 2);
    assert_eq!(result.stats.records_kept, 2 + 7 * 3 + 1 + 2);
    assert_eq!(result.records.len(), result.stats.records_kept);
    assert_eq!(result.stats.escalated_windows, 1);

    // Range order is preserved
    assert_eq!(kept.first().map(String::as_str), Some("w2024-01-01-0"));
    assert_eq!(kept.last().map(String::as_str), Some("w2024-01-15-1"));
    assert_eq!(sleeper.sleeps().len(), 10);
}

#[tokio::test]
async fn test_window_below_threshold_is_accepted() {
    let gateway = FakeGateway::new(|call| {
        let (start, _) = call.window().unwrap();
        Ok(commits("quiet", 99, start))
    });
    let controller = controller(gateway.clone(), Arc::new(RecordingSleeper::new()));

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 1), date(2024, 1, 7))
        .await
        .unwrap();

    assert_eq!(gateway.call_count(), 1);
    assert_eq!(result.records.len(), 99);
    assert_eq!(result.stats.escalated_windows, 0);
}

#[tokio::test]
async fn test_busy_single_day_is_not_escalated() {
    let gateway = FakeGateway::new(|call| {
        let (start, _) = call.window().unwrap();
        Ok(commits("day", 150, start))
    });
    let controller = controller(gateway.clone(), Arc::new(RecordingSleeper::new()));

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 2, 29), date(2024, 2, 29))
        .await
        .unwrap();

    assert_eq!(gateway.call_count(), 1);
    assert_eq!(result.records.len(), 150);
}

#[tokio::test]
async fn test_invalid_range_makes_no_calls() {
    let gateway = FakeGateway::empty();
    let controller = controller(gateway.clone(), Arc::new(RecordingSleeper::new()));

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 2, 1), date(2024, 1, 1))
        .await;

    assert!(matches!(result, Err(FetchError::InvalidRange(_))));
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn test_failed_window_yields_partial_result() {
    let gateway = FakeGateway::new(|call| {
        let (start, _) = call.window().unwrap();
        if start == date(2024, 1, 8) {
            Err(CallError::Unauthorized {
                status: 401,
                message: "bad credentials".to_string(),
            })
        } else {
            Ok(commits(&format!("w{start}"), 1, start))
        }
    });
    let controller = controller(gateway.clone(), Arc::new(RecordingSleeper::new()));

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 1), date(2024, 1, 21))
        .await
        .unwrap();

    assert!(result.is_partial());
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].attempts, 1);
    assert_eq!(result.failures[0].unit.to_string(), "window 2024-01-08..2024-01-14");
    assert_eq!(result.records.len(), 2);
}

#[tokio::test]
async fn test_failed_day_in_escalated_window_is_recorded() {
    let gateway = FakeGateway::new(|call| {
        let (start, end) = call.window().unwrap();
        if start != end {
            return Ok(commits("busy", 100, start));
        }
        if start == date(2024, 1, 3) {
            return Err(CallError::MalformedResponse("truncated body".to_string()));
        }
        Ok(commits(&format!("d{start}"), 1, start))
    });
    let controller = controller(gateway.clone(), Arc::new(RecordingSleeper::new()));

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 1), date(2024, 1, 7))
        .await
        .unwrap();

    assert_eq!(gateway.call_count(), 8);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].unit.to_string(), "day 2024-01-03");
    assert_eq!(result.records.len(), 6);
}

#[tokio::test]
async fn test_records_without_identity_survive_dedup() {
    let gateway = FakeGateway::new(|_| {
        Ok(vec![
            ActivityRecord::Commit(Default::default()),
            ActivityRecord::Commit(Default::default()),
        ])
    });
    let controller = controller(gateway.clone(), Arc::new(RecordingSleeper::new()));

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 1), date(2024, 1, 14))
        .await
        .unwrap();

    assert_eq!(result.records.len(), 4);
}

#[tokio::test]
async fn test_partial_final_window_is_escalated() {
    let gateway = FakeGateway::new(|call| {
        let (start, end) = call.window().unwrap();
        if start == end {
            Ok(vec![commit(&format!("day-{start}"), start)])
        } else {
            Ok(commits("window", 100, start))
        }
    });
    let controller = controller(gateway.clone(), Arc::new(RecordingSleeper::new()));

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 29), date(2024, 1, 31))
        .await
        .unwrap();

    let windows: Vec<_> = gateway.calls().iter().filter_map(FakeCall::window).collect();
    assert_eq!(
        windows,
        vec![
            (date(2024, 1, 29), date(2024, 1, 31)),
            (date(2024, 1, 29), date(2024, 1, 29)),
            (date(2024, 1, 30), date(2024, 1, 30)),
            (date(2024, 1, 31), date(2024, 1, 31)),
        ]
    );
    assert_eq!(
        shas(&result.records),
        vec!["day-2024-01-29", "day-2024-01-30", "day-2024-01-31"]
    );
    assert_eq!(result.stats.escalated_windows, 1);
}

#[tokio::test]
async fn test_duplicate_across_distant_windows_is_kept_once() {
    let gateway = FakeGateway::new(|call| {
        let (start, _) = call.window().unwrap();
        let mut records = commits(&format!("w{start}"), 2, start);
        if start == date(2024, 1, 1) || start == date(2024, 1, 15) {
            records.push(commit("rebased", start));
        }
        Ok(records)
    });
    let controller = controller(gateway.clone(), Arc::new(RecordingSleeper::new()));

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 1), date(2024, 1, 21))
        .await
        .unwrap();

    assert_eq!(gateway.call_count(), 3);
    let kept = shas(&result.records);
    assert_eq!(
        kept,
        vec![
            "w2024-01-01-0",
            "w2024-01-01-1",
            "rebased",
            "w2024-01-08-0",
            "w2024-01-08-1",
            "w2024-01-15-0",
            "w2024-01-15-1",
        ]
    );
    // First occurrence wins: the week-one copy
    match &result.records[2] {
        ActivityRecord::Commit(c) => {
            assert_eq!(c.committed_at.map(|at| at.date_naive()), Some(date(2024, 1, 1)))
        }
        other => panic!("unexpected record: {other:?}"),
    }
    assert_eq!(result.stats.records_fetched, 8);
    assert_eq!(result.stats.records_kept, 7);
}
