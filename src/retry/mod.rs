//! Retry policy
//!
//! [`RetryPolicy::decide`] is a pure function of the failure count and the
//! error: fatal errors give up immediately, retryable ones wait
//! `backoff_base^n` seconds (capped), and rate limits with a reset hint wait
//! for the hint instead. [`RetryPolicy::run`] drives an async operation under
//! that policy.

use crate::clock::Sleeper;
use crate::config::FetchConfig;
use crate::gateway::CallError;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub mod formatter;

pub use formatter::RetryContext;

/// Classification of call failures for retrying and messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Call exceeded its timeout
    Timeout,
    /// Connection refused, DNS failure, reset and other transport problems
    Network,
    /// Rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    Server(u16),
    /// Authentication or authorisation failure (401/403)
    Unauthorized(u16),
    /// Request rejected as invalid
    MalformedRequest,
    /// Response could not be interpreted
    MalformedResponse,
}

impl ErrorClass {
    /// User-friendly description used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "call timeout",
            Self::Network => "network error",
            Self::RateLimit => "rate limit exceeded",
            Self::Server(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::Unauthorized(code) => match code {
                401 => "authentication failed (401)",
                403 => "access denied (403)",
                _ => "authentication failed",
            },
            Self::MalformedRequest => "invalid request",
            Self::MalformedResponse => "unreadable response",
        }
    }

    /// Suggested remediation shown after a final failure.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Timeout => "Increase --timeout or check network latency",
            Self::Network => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Increase --request-delay or wait for the rate limit to reset",
            Self::Server(_) => "The API may be experiencing issues, try again later",
            Self::Unauthorized(_) => "Check that GITHUB_TOKEN is set and has the required scopes",
            Self::MalformedRequest => "Check the user name, record kind and date range",
            Self::MalformedResponse => "The API returned unexpected data; retry later or report it",
        }
    }

    /// Whether failures of this class are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network | Self::RateLimit | Self::Server(_)
        )
    }

    /// Stable snake_case name, used as a metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Server(_) => "server",
            Self::Unauthorized(_) => "unauthorized",
            Self::MalformedRequest => "malformed_request",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`RetryPolicy::decide`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`
    Retry {
        /// Wait before the next attempt
        delay: Duration,
    },
    /// Stop; the last error is final
    GiveUp,
}

/// Successful value plus the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    /// Operation result
    pub value: T,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// Terminal failure after retries were exhausted or a fatal error occurred
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryFailure {
    /// Last error observed
    pub error: CallError,
    /// Attempts made
    pub attempts: u32,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: f64,
    max_backoff: Duration,
    max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    /// Create a policy
    ///
    /// # Arguments
    /// * `max_retries` - Retries after the first attempt
    /// * `backoff_base` - Retry n waits `backoff_base^n` seconds
    /// * `max_backoff` - Cap on the exponential delay
    /// * `max_rate_limit_wait` - Cap on a server-provided reset wait
    pub fn new(
        max_retries: u32,
        backoff_base: f64,
        max_backoff: Duration,
        max_rate_limit_wait: Duration,
    ) -> Self {
        Self {
            max_retries,
            backoff_base,
            max_backoff,
            max_rate_limit_wait,
        }
    }

    /// Policy matching a fetch configuration
    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            config.max_retries,
            config.backoff_base,
            config.max_backoff,
            config.max_rate_limit_wait,
        )
    }

    /// Retries allowed after the first attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Upper bound on attempts for one call
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Exponential delay before retry `retry_number` (1-based), capped
    pub fn backoff_delay(&self, retry_number: u32) -> Duration {
        let exponent = i32::try_from(retry_number).unwrap_or(i32::MAX);
        let secs = self.backoff_base.powi(exponent);
        if !secs.is_finite() || secs < 0.0 {
            return self.max_backoff;
        }
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(self.max_backoff))
            .unwrap_or(self.max_backoff)
    }

    /// Decide what to do after the `retry_number`-th failure (1-based)
    ///
    /// Fatal errors give up at once. Once `retry_number` exceeds
    /// `max_retries` the call gives up. Rate limits carrying a reset hint
    /// wait for the hint (capped) instead of the exponential schedule.
    pub fn decide(&self, retry_number: u32, error: &CallError) -> RetryDecision {
        if !error.is_retryable() || retry_number > self.max_retries {
            return RetryDecision::GiveUp;
        }

        let delay = match error.retry_after() {
            Some(hint) => hint.min(self.max_rate_limit_wait),
            None => self.backoff_delay(retry_number),
        };
        RetryDecision::Retry { delay }
    }

    /// Run `operation` until it succeeds or the policy gives up
    ///
    /// The first attempt starts immediately. Waits go through `sleeper`;
    /// `label` identifies the call in log lines.
    pub async fn run<T, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        label: &str,
        mut operation: F,
    ) -> Result<Attempted<T>, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut attempts = 0u32;
        let mut last_class = None;

        loop {
            attempts += 1;
            let error = match operation().await {
                Ok(value) => {
                    if let Some(class) = last_class {
                        let ctx = RetryContext::new(
                            attempts,
                            self.max_attempts(),
                            class,
                            Duration::ZERO,
                            label,
                            "",
                        );
                        info!("{}", ctx.format_success());
                    }
                    return Ok(Attempted { value, attempts });
                }
                Err(error) => error,
            };
            last_class = Some(error.class());

            match self.decide(attempts, &error) {
                RetryDecision::Retry { delay } => {
                    let ctx = RetryContext::new(
                        attempts,
                        self.max_attempts(),
                        error.class(),
                        delay,
                        label,
                        error.to_string(),
                    );
                    warn!(
                        error_class = %error.class(),
                        attempt = attempts,
                        delay_secs = delay.as_secs_f64(),
                        "{}",
                        ctx.format_retry()
                    );
                    crate::metrics::record_retry(error.class());
                    sleeper.sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    let ctx = RetryContext::new(
                        attempts,
                        self.max_attempts(),
                        error.class(),
                        Duration::ZERO,
                        label,
                        error.to_string(),
                    );
                    warn!(error_class = %error.class(), "{}", ctx.format_failure());
                    return Err(RetryFailure { error, attempts });
                }
            }
        }
    }
}
