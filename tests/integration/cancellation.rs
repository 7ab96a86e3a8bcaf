//! Integration tests for cooperative cancellation

use std::sync::Arc;
use std::time::Duration;

use activity_fetcher::cancel::CancelHandle;
use activity_fetcher::clock::{RecordingSleeper, Sleeper};
use activity_fetcher::config::FetchConfig;
use activity_fetcher::fetcher::AdaptiveFetchController;
use activity_fetcher::RecordKind;
use async_trait::async_trait;

use crate::support::{commits, date, FakeGateway};

#[tokio::test]
async fn test_cancel_stops_between_windows_and_keeps_records() {
    let cancel = CancelHandle::new();
    let gateway = FakeGateway::new({
        let cancel = cancel.clone();
        move |call| {
            let (start, _) = call.window().unwrap();
            // Ctrl+C arrives while the second window is in flight
            if start == date(2024, 1, 8) {
                cancel.cancel();
            }
            Ok(commits(&format!("w{start}"), 2, start))
        }
    });

    let controller = AdaptiveFetchController::new(gateway.clone(), FetchConfig::default())
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::new()))
        .with_cancel(cancel);

    let result = controller
        .fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 1), date(2024, 1, 31))
        .await
        .unwrap();

    assert_eq!(gateway.call_count(), 2);
    assert!(result.cancelled);
    assert!(result.is_partial());
    assert!(result.failures.is_empty());
    assert_eq!(result.records.len(), 4);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let cancel = CancelHandle::new();
    cancel.cancel();
    let gateway = FakeGateway::empty();

    let controller = AdaptiveFetchController::new(gateway.clone(), FetchConfig::default())
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::new()))
        .with_cancel(cancel);

    let result = controller
        .fetch_related_many(RecordKind::Review, &[("octo/a", "1"), ("octo/a", "2")])
        .await;

    assert_eq!(gateway.call_count(), 0);
    assert!(result.cancelled);
}

/// Waits forever; only a cancellation can end a pause
struct StalledSleeper;

#[async_trait]
impl Sleeper for StalledSleeper {
    async fn sleep(&self, _duration: Duration) {
        std::future::pending::<()>().await
    }
}

#[tokio::test]
async fn test_cancel_interrupts_pacing_pause() {
    let cancel = CancelHandle::new();
    let gateway = FakeGateway::new({
        let cancel = cancel.clone();
        move |call| {
            let (start, _) = call.window().unwrap();
            cancel.cancel();
            Ok(commits("first", 3, start))
        }
    });

    let controller = AdaptiveFetchController::new(
        gateway.clone(),
        FetchConfig::default().with_request_delay(Duration::from_secs(3600)),
    )
    .unwrap()
    .with_sleeper(Arc::new(StalledSleeper))
    .with_cancel(cancel);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        controller.fetch_range(RecordKind::Commit, "octocat", date(2024, 1, 1), date(2024, 1, 31)),
    )
    .await
    .expect("pacing pause should end on cancellation")
    .unwrap();

    assert_eq!(gateway.call_count(), 1);
    assert!(result.cancelled);
    assert_eq!(result.records.len(), 3);
}
