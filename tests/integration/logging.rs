//! Integration tests for logging and tracing

use std::sync::Arc;
use std::time::Duration;

use activity_fetcher::clock::RecordingSleeper;
use activity_fetcher::config::FetchConfig;
use activity_fetcher::fetcher::AdaptiveFetchController;
use activity_fetcher::RecordKind;
use tracing_subscriber::EnvFilter;

use crate::support::{date, server_error, FakeGateway};

#[test]
fn test_env_filter_parsing() {
    for directive in [
        "info",
        "activity_fetcher=debug",
        "warn,activity_fetcher=trace",
    ] {
        assert!(EnvFilter::try_new(directive).is_ok(), "{directive}");
    }
}

#[test]
fn test_json_subscriber_initialization() {
    let result = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("activity_fetcher=info"))
        .with_test_writer()
        .try_init();

    // Another test may have installed a subscriber first
    assert!(result.is_ok() || result.is_err());
}

#[tokio::test]
async fn test_fetch_runs_with_debug_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("activity_fetcher=debug"))
        .with_test_writer()
        .try_init();

    let gateway = FakeGateway::failing_with(vec![server_error()]);
    let controller = AdaptiveFetchController::new(
        gateway.clone(),
        FetchConfig::default().with_request_delay(Duration::ZERO),
    )
    .unwrap()
    .with_sleeper(Arc::new(RecordingSleeper::new()));

    let result = controller
        .fetch_range(RecordKind::Issue, "octocat", date(2024, 3, 1), date(2024, 3, 10))
        .await
        .unwrap();

    assert_eq!(gateway.call_count(), 3);
    assert!(!result.is_partial());
}
