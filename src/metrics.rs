//! Operational metrics for the fetch engine
//!
//! Counters and histograms for live calls, cache hits, retries, escalations
//! and failed units, emitted through the `metrics` facade. Without an
//! installed recorder every call is a no-op; the binary installs a
//! Prometheus exporter when `--metrics-addr` is given.

use crate::retry::ErrorClass;
use crate::RecordKind;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Metrics initialization errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed
    #[error("failed to install Prometheus exporter on {addr}: {message}")]
    Install {
        /// Requested listen address
        addr: SocketAddr,
        /// Underlying error
        message: String,
    },
}

/// Initialize metrics with a Prometheus scrape endpoint
///
/// Idempotent: later calls are ignored once an exporter is installed.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g., "127.0.0.1:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let mut initialized = METRICS_INITIALIZED.lock().unwrap_or_else(|e| e.into_inner());
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install {
            addr,
            message: e.to_string(),
        })?;

    describe_counter!(
        "fetch_live_calls_total",
        Unit::Count,
        "Total number of external calls that were not served from cache"
    );

    describe_counter!(
        "fetch_cache_hits_total",
        Unit::Count,
        "Total number of fetch units served from the response cache"
    );

    describe_counter!(
        "fetch_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );

    describe_counter!(
        "fetch_escalations_total",
        Unit::Count,
        "Total number of windows re-fetched at day granularity"
    );

    describe_counter!(
        "fetch_unit_failures_total",
        Unit::Count,
        "Total number of windows, days or related items that failed after retries"
    );

    describe_histogram!(
        "fetch_call_duration_seconds",
        Unit::Seconds,
        "Duration of a live call including retries"
    );

    describe_histogram!(
        "fetch_run_duration_seconds",
        Unit::Seconds,
        "Duration of a complete fetch run"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if the exporter is installed
pub fn is_initialized() -> bool {
    *METRICS_INITIALIZED.lock().unwrap_or_else(|e| e.into_inner())
}

/// Record a live call and its duration (retries included)
pub fn record_live_call(kind: RecordKind, outcome: &'static str, duration: Duration) {
    counter!(
        "fetch_live_calls_total",
        "kind" => kind.as_str(),
        "outcome" => outcome,
    )
    .increment(1);

    histogram!(
        "fetch_call_duration_seconds",
        "kind" => kind.as_str(),
    )
    .record(duration.as_secs_f64());
}

/// Record a unit served from cache
pub fn record_cache_hit(kind: RecordKind) {
    counter!("fetch_cache_hits_total", "kind" => kind.as_str()).increment(1);
}

/// Record a retry attempt
pub fn record_retry(class: ErrorClass) {
    counter!("fetch_retries_total", "error_class" => class.as_str()).increment(1);
}

/// Record a window escalated to day granularity
pub fn record_escalation(kind: RecordKind) {
    counter!("fetch_escalations_total", "kind" => kind.as_str()).increment(1);
}

/// Record a unit that failed after retries
pub fn record_unit_failure(kind: RecordKind, class: ErrorClass) {
    counter!(
        "fetch_unit_failures_total",
        "kind" => kind.as_str(),
        "error_class" => class.as_str(),
    )
    .increment(1);
}

/// Fetch run metrics
pub struct RunMetrics {
    kind: RecordKind,
    identity: String,
    start_time: Instant,
}

impl RunMetrics {
    /// Start tracking a fetch run
    pub fn start(kind: RecordKind, identity: impl Into<String>) -> Self {
        let identity = identity.into();

        info!(
            kind = %kind,
            identity = %identity,
            "Fetch run started"
        );

        Self {
            kind,
            identity,
            start_time: Instant::now(),
        }
    }

    /// Record the end of a run
    pub fn record_complete(&self, records: usize, failed_units: usize, cancelled: bool) {
        let duration = self.start_time.elapsed();

        histogram!(
            "fetch_run_duration_seconds",
            "kind" => self.kind.as_str(),
        )
        .record(duration.as_secs_f64());

        if failed_units > 0 || cancelled {
            error!(
                kind = %self.kind,
                identity = %self.identity,
                records,
                failed_units,
                cancelled,
                duration_secs = duration.as_secs(),
                "Fetch run finished with a partial result"
            );
        } else {
            info!(
                kind = %self.kind,
                identity = %self.identity,
                records,
                duration_secs = duration.as_secs(),
                "Fetch run completed successfully"
            );
        }
    }
}
