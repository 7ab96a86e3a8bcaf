//! Adaptive fetch controller
//!
//! For each window in range order:
//! 1. stop if cancellation was requested;
//! 2. serve the window from cache, or call the gateway under the retry policy
//!    and cache the result;
//! 3. if the window returned at least `high_activity_threshold` records,
//!    drop that result and fetch each day of the window instead;
//! 4. append the accepted records;
//! 5. pause `request_delay` after every live call.
//!
//! Units that still fail are recorded and the run carries on.

use crate::cache::{CacheKey, NoCache, ResponseCache};
use crate::cancel::CancelHandle;
use crate::clock::{Sleeper, TokioSleeper};
use crate::config::FetchConfig;
use crate::dedup::Deduplicator;
use crate::fetcher::{FetchError, FetchFailure, FetchResult, FetchStats, FetchUnit};
use crate::gateway::{CallError, CallGateway};
use crate::metrics::{self, RunMetrics};
use crate::retry::RetryPolicy;
use crate::{ActivityRecord, FetchWindow, RecordKind, Segmenter};
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// Drives window-by-window fetching with caching, retries and escalation
#[derive(Clone)]
pub struct AdaptiveFetchController {
    gateway: Arc<dyn CallGateway>,
    cache: Arc<dyn ResponseCache>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    config: FetchConfig,
    cancel: Option<CancelHandle>,
}

impl std::fmt::Debug for AdaptiveFetchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveFetchController")
            .field("config", &self.config)
            .field("cache_enabled", &self.cache.is_enabled())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl AdaptiveFetchController {
    /// Create a controller with no cache and real sleeping
    ///
    /// # Errors
    /// Returns [`FetchError::Config`] when `config` fails validation
    pub fn new(gateway: Arc<dyn CallGateway>, config: FetchConfig) -> Result<Self, FetchError> {
        config.validate()?;
        Ok(Self {
            gateway,
            cache: Arc::new(NoCache),
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::from_config(&config),
            config,
            cancel: None,
        })
    }

    /// Use `cache` for responses
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Route pacing and backoff waits through `sleeper`
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Observe `cancel` between windows
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch every record of `kind` for `identity` between `start` and `end` (inclusive)
    ///
    /// # Errors
    /// Returns [`FetchError::InvalidRange`] before any call when `start > end`.
    /// Gateway failures do not error; they are listed in [`FetchResult::failures`].
    pub async fn fetch_range(
        &self,
        kind: RecordKind,
        identity: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, FetchError> {
        let windows = Segmenter::new(start, end)?;
        let span = info_span!(
            "fetch_range",
            kind = %kind,
            identity = %identity,
            start = %start,
            end = %end
        );
        Ok(self.run_windows(kind, identity, windows).instrument(span).await)
    }

    /// Fetch records of `kind` attached to one item
    pub async fn fetch_related(&self, kind: RecordKind, parent: &str, child: &str) -> FetchResult {
        self.fetch_related_many(kind, &[(parent, child)]).await
    }

    /// Fetch records of `kind` attached to each `(parent, child)` pair, in order
    ///
    /// Failed pairs are recorded; the union of the rest is deduplicated.
    pub async fn fetch_related_many<P, C>(&self, kind: RecordKind, pairs: &[(P, C)]) -> FetchResult
    where
        P: AsRef<str>,
        C: AsRef<str>,
    {
        let span = info_span!("fetch_related", kind = %kind, items = pairs.len());
        async {
            let run_metrics = RunMetrics::start(kind, "related");
            let mut result = FetchResult::new(kind);
            let mut records = Vec::new();

            for (parent, child) in pairs {
                if self.is_cancelled() {
                    info!(processed = result.stats.windows, "Cancellation requested, stopping");
                    result.cancelled = true;
                    break;
                }
                result.stats.windows += 1;

                let unit = FetchUnit::Related {
                    parent: parent.as_ref().to_string(),
                    child: child.as_ref().to_string(),
                };
                match self.fetch_unit(kind, "", &unit, &mut result.stats).await {
                    Ok(fetched) => records.extend(fetched),
                    Err(failure) => result.failures.push(failure),
                }
            }

            self.finish(&mut result, records);
            run_metrics.record_complete(result.records.len(), result.failures.len(), result.cancelled);
            result
        }
        .instrument(span)
        .await
    }

    async fn run_windows(&self, kind: RecordKind, identity: &str, windows: Segmenter) -> FetchResult {
        let run_metrics = RunMetrics::start(kind, identity);
        let threshold = self.config.high_activity_threshold;
        let mut result = FetchResult::new(kind);
        let mut records = Vec::new();

        for window in windows {
            if self.is_cancelled() {
                info!(next_window = %window, "Cancellation requested, stopping");
                result.cancelled = true;
                break;
            }
            result.stats.windows += 1;

            let unit = FetchUnit::Window { window };
            let fetched = match self.fetch_unit(kind, identity, &unit, &mut result.stats).await {
                Ok(fetched) => fetched,
                Err(failure) => {
                    result.failures.push(failure);
                    continue;
                }
            };

            if fetched.len() < threshold {
                debug!(window = %window, records = fetched.len(), "Window accepted");
                records.extend(fetched);
                continue;
            }

            if window.is_single_day() {
                warn!(
                    day = %window.start(),
                    records = fetched.len(),
                    threshold,
                    "Single day reached the high-activity threshold; results may be truncated"
                );
                records.extend(fetched);
                continue;
            }

            info!(
                window = %window,
                records = fetched.len(),
                threshold,
                "High-activity window, re-fetching day by day"
            );
            result.stats.escalated_windows += 1;
            metrics::record_escalation(kind);
            drop(fetched);

            self.fetch_days(kind, identity, &window, &mut result, &mut records)
                .await;
        }

        self.finish(&mut result, records);
        run_metrics.record_complete(result.records.len(), result.failures.len(), result.cancelled);
        result
    }

    async fn fetch_days(
        &self,
        kind: RecordKind,
        identity: &str,
        window: &FetchWindow,
        result: &mut FetchResult,
        records: &mut Vec<ActivityRecord>,
    ) {
        let threshold = self.config.high_activity_threshold;

        for day in window.days() {
            let unit = FetchUnit::Day { day: day.start() };
            match self.fetch_unit(kind, identity, &unit, &mut result.stats).await {
                Ok(fetched) => {
                    if fetched.len() >= threshold {
                        warn!(
                            day = %day.start(),
                            records = fetched.len(),
                            threshold,
                            "Day reached the high-activity threshold; results may be truncated"
                        );
                    }
                    records.extend(fetched);
                }
                Err(failure) => result.failures.push(failure),
            }
        }
    }

    /// Fetch one unit through the cache and the retry policy
    async fn fetch_unit(
        &self,
        kind: RecordKind,
        identity: &str,
        unit: &FetchUnit,
        stats: &mut FetchStats,
    ) -> Result<Vec<ActivityRecord>, FetchFailure> {
        let key = unit.cache_key(kind, identity, self.gateway.source());

        if let Some(payload) = self.cache.get(&key) {
            match serde_json::from_value::<Vec<ActivityRecord>>(payload) {
                Ok(records) => {
                    debug!(unit = %unit, records = records.len(), "Cache hit");
                    stats.cache_hits += 1;
                    metrics::record_cache_hit(kind);
                    return Ok(records);
                }
                Err(e) => {
                    warn!(unit = %unit, error = %e, "Cached payload is not a record list, refetching");
                }
            }
        }

        let label = format!("{kind} {unit}");
        let timeout = self.config.call_timeout;
        let gateway = self.gateway.as_ref();
        let started = Instant::now();

        let outcome = self
            .retry
            .run(self.sleeper.as_ref(), &label, move || {
                with_timeout(timeout, call_gateway(gateway, kind, identity, unit))
            })
            .await;

        let attempts = match &outcome {
            Ok(attempted) => attempted.attempts,
            Err(failure) => failure.attempts,
        };
        stats.live_calls += attempts as usize;
        stats.retries += attempts.saturating_sub(1) as usize;

        let result = match outcome {
            Ok(attempted) => {
                metrics::record_live_call(kind, "success", started.elapsed());
                self.store(&key, unit, &attempted.value);
                Ok(attempted.value)
            }
            Err(failure) => {
                let class = failure.error.class();
                metrics::record_live_call(kind, "failure", started.elapsed());
                metrics::record_unit_failure(kind, class);
                warn!(
                    unit = %unit,
                    error = %failure.error,
                    error_class = %class,
                    attempts = failure.attempts,
                    "Unit failed, continuing with a partial result"
                );
                Err(FetchFailure {
                    unit: unit.clone(),
                    error: failure.error,
                    class,
                    attempts: failure.attempts,
                })
            }
        };

        self.pace().await;
        result
    }

    fn store(&self, key: &CacheKey, unit: &FetchUnit, records: &[ActivityRecord]) {
        if !self.cache.is_enabled() {
            return;
        }
        let payload = match serde_json::to_value(records) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(unit = %unit, error = %e, "Failed to encode records for cache");
                return;
            }
        };
        if let Err(e) = self.cache.put(key, &payload) {
            warn!(unit = %unit, error = %e, "Failed to cache response, continuing without it");
        }
    }

    /// Pause `request_delay`; a cancellation request cuts the pause short
    async fn pace(&self) {
        if self.config.request_delay.is_zero() {
            return;
        }
        match &self.cancel {
            Some(cancel) => {
                tokio::select! {
                    _ = self.sleeper.sleep(self.config.request_delay) => {}
                    _ = cancel.cancelled() => {
                        debug!("Cancellation requested, pacing interrupted");
                    }
                }
            }
            None => self.sleeper.sleep(self.config.request_delay).await,
        }
    }

    fn finish(&self, result: &mut FetchResult, records: Vec<ActivityRecord>) {
        result.stats.records_fetched = records.len();
        result.records = Deduplicator::new().dedup(records);
        result.stats.records_kept = result.records.len();

        info!(
            kind = %result.kind,
            windows = result.stats.windows,
            escalated = result.stats.escalated_windows,
            live_calls = result.stats.live_calls,
            cache_hits = result.stats.cache_hits,
            fetched = result.stats.records_fetched,
            kept = result.stats.records_kept,
            failures = result.failures.len(),
            cancelled = result.cancelled,
            "Fetch finished"
        );
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancelHandle::is_cancelled)
            .unwrap_or(false)
    }
}

async fn call_gateway(
    gateway: &dyn CallGateway,
    kind: RecordKind,
    identity: &str,
    unit: &FetchUnit,
) -> Result<Vec<ActivityRecord>, CallError> {
    match unit {
        FetchUnit::Window { window } => gateway.fetch_by_window(kind, identity, window).await,
        FetchUnit::Day { day } => {
            let window = FetchWindow::single_day(*day);
            gateway.fetch_by_window(kind, identity, &window).await
        }
        FetchUnit::Related { parent, child } => gateway.fetch_single(kind, parent, child).await,
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, CallError>>,
) -> Result<T, CallError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CallError::Timeout(timeout)),
    }
}
