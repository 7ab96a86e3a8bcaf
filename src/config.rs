//! Fetch and cache configuration
//!
//! Defaults match the tool's historical behaviour. All values are plain data;
//! the CLI fills them from flags and library callers build them directly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Record count at which a window is re-fetched day by day.
/// The search API returns at most 100 items per page, so a full page means
/// the window was probably truncated.
pub const DEFAULT_HIGH_ACTIVITY_THRESHOLD: usize = 100;

/// Delay after every live API call, in seconds.
/// The search API allows 30 authenticated requests per minute.
pub const DEFAULT_REQUEST_DELAY_SECS: f64 = 1.0;

/// Maximum number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Exponential backoff base in seconds (retry n waits base^n).
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// Maximum exponential backoff delay in seconds.
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 120;

/// Maximum wait honoured for a server-provided rate-limit reset, in seconds.
/// The primary rate limit window is one hour.
pub const DEFAULT_MAX_RATE_LIMIT_WAIT_SECS: u64 = 3600;

/// Per-call timeout in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Default cache entry lifetime in hours.
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Threshold must be positive
    #[error("high_activity_threshold must be at least 1")]
    ZeroThreshold,

    /// Backoff base must be a finite number >= 1
    #[error("backoff_base must be a finite number >= 1.0, got {0}")]
    InvalidBackoffBase(f64),

    /// Timeout must be positive
    #[error("call_timeout must be greater than zero")]
    ZeroTimeout,

    /// Cache directory must be set when caching is enabled
    #[error("cache directory must not be empty when the cache is enabled")]
    EmptyCacheDirectory,
}

/// Tuning for the adaptive fetch controller and its retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Window record count that triggers day-level escalation
    pub high_activity_threshold: usize,
    /// Pause after every live call
    #[serde(with = "duration_secs")]
    pub request_delay: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Exponential backoff base, in seconds
    pub backoff_base: f64,
    /// Cap on exponential backoff
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,
    /// Cap on a rate-limit reset wait
    #[serde(with = "duration_secs")]
    pub max_rate_limit_wait: Duration,
    /// Upper bound on a single call
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            high_activity_threshold: DEFAULT_HIGH_ACTIVITY_THRESHOLD,
            request_delay: Duration::from_secs_f64(DEFAULT_REQUEST_DELAY_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
            max_rate_limit_wait: Duration::from_secs(DEFAULT_MAX_RATE_LIMIT_WAIT_SECS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl FetchConfig {
    /// Set the escalation threshold
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.high_activity_threshold = threshold;
        self
    }

    /// Set the pacing delay
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the backoff base
    pub fn with_backoff_base(mut self, base: f64) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set the backoff cap
    pub fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = cap;
        self
    }

    /// Set the rate-limit wait cap
    pub fn with_max_rate_limit_wait(mut self, cap: Duration) -> Self {
        self.max_rate_limit_wait = cap;
        self
    }

    /// Set the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Reject values the controller cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.high_activity_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if !self.backoff_base.is_finite() || self.backoff_base < 1.0 {
            return Err(ConfigError::InvalidBackoffBase(self.backoff_base));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Response cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether responses are cached at all
    pub enabled: bool,
    /// Directory holding one file per entry
    pub directory: PathBuf,
    /// Entry lifetime
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(DEFAULT_CACHE_DIR),
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_HOURS * 3600),
        }
    }
}

impl CacheConfig {
    /// Disabled cache
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the cache directory
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the entry lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Reject an enabled cache without a directory
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.directory.as_os_str().is_empty() {
            return Err(ConfigError::EmptyCacheDirectory);
        }
        Ok(())
    }
}

/// Durations as (fractional) seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
