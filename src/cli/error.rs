//! CLI error types and conversions

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::fetcher::FetchError;
use crate::gateway::CallError;
use crate::metrics::MetricsError;
use crate::output::OutputError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Fetch could not start
    #[error("fetch error: {0}")]
    FetchError(#[from] FetchError),

    /// Gateway could not be built
    #[error("gateway error: {0}")]
    GatewayError(#[from] CallError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Cache maintenance error
    #[error("cache error: {0}")]
    CacheError(#[from] CacheError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Records were written but some units failed or the run was interrupted
    #[error("partial result: {failed_units} unit(s) failed{}", if *.cancelled { ", run cancelled" } else { "" })]
    PartialResult {
        /// Units that failed after retries
        failed_units: usize,
        /// Whether the run was cancelled
        cancelled: bool,
    },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::PartialResult { .. } => 2,
            _ => 1,
        }
    }
}
