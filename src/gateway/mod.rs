//! Call gateways
//!
//! The fetch controller talks to the outside world only through
//! [`CallGateway`]. Implementations are responsible for authentication,
//! transport and parsing; they report failures as [`CallError`] values that
//! already carry their retry classification.

use crate::retry::ErrorClass;
use crate::{ActivityRecord, FetchWindow, RecordKind};
use async_trait::async_trait;
use std::time::Duration;

pub mod github;
pub mod github_parser;

/// Failure of a single external call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The call did not complete in time
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// The server asked us to slow down
    #[error("rate limited: {message}")]
    RateLimited {
        /// Server-provided wait before the limit resets
        retry_after: Option<Duration>,
        /// Server message
        message: String,
    },

    /// Server-side failure (5xx)
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Server message
        message: String,
    },

    /// Authentication or authorisation failure
    #[error("unauthorized ({status}): {message}")]
    Unauthorized {
        /// HTTP status code
        status: u16,
        /// Server message
        message: String,
    },

    /// The request itself was rejected as invalid
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The response could not be interpreted
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl CallError {
    /// Retry classification of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            CallError::Timeout(_) => ErrorClass::Timeout,
            CallError::Network(_) => ErrorClass::Network,
            CallError::RateLimited { .. } => ErrorClass::RateLimit,
            CallError::Server { status, .. } => ErrorClass::Server(*status),
            CallError::Unauthorized { status, .. } => ErrorClass::Unauthorized(*status),
            CallError::MalformedRequest(_) => ErrorClass::MalformedRequest,
            CallError::MalformedResponse(_) => ErrorClass::MalformedResponse,
        }
    }

    /// Server-provided reset hint, only present on rate limits
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CallError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the retry policy may try again
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

/// Source of activity records
#[async_trait]
pub trait CallGateway: Send + Sync {
    /// Fetch all records of `kind` for `identity` within `window`
    ///
    /// # Arguments
    /// * `kind` - Record kind to fetch
    /// * `identity` - User login whose activity is fetched
    /// * `window` - Inclusive date range
    async fn fetch_by_window(
        &self,
        kind: RecordKind,
        identity: &str,
        window: &FetchWindow,
    ) -> Result<Vec<ActivityRecord>, CallError>;

    /// Fetch records of `kind` attached to one item
    ///
    /// # Arguments
    /// * `kind` - Record kind to fetch
    /// * `parent` - Owning container (e.g. `owner/repo`)
    /// * `child` - Item within the container (e.g. a pull request number)
    async fn fetch_single(
        &self,
        kind: RecordKind,
        parent: &str,
        child: &str,
    ) -> Result<Vec<ActivityRecord>, CallError>;

    /// Name of the data source, folded into every cache key
    ///
    /// Gateways pointed at different API roots must return different names.
    fn source(&self) -> &str {
        ""
    }
}
