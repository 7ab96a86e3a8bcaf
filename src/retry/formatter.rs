//! Retry message formatting.
//!
//! Produces the consistent, human-readable lines logged while a call is being
//! retried and when it finally gives up.

use crate::retry::ErrorClass;
use std::time::Duration;

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Classification of the error that triggered the retry
    pub error_class: ErrorClass,
    /// Wait before the next attempt
    pub backoff_duration: Duration,
    /// What is being fetched (e.g. "commit 2024-01-01..2024-01-07")
    pub label: String,
    /// Original error message
    pub error_message: String,
}

impl RetryContext {
    /// Convenience constructor used by the retry loop.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error_class: ErrorClass,
        backoff_duration: Duration,
        label: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_class,
            backoff_duration,
            label: label.into(),
            error_message: error_message.into(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt + 1,
            self.max_attempts,
            self.error_class.description(),
            self.backoff_duration.as_secs_f64()
        );
        append_label(&mut message, &self.label);
        message
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Retry attempt {}/{} succeeded",
            self.attempt, self.max_attempts
        );
        append_label(&mut message, &self.label);
        message
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let label = if self.label.is_empty() {
            "unknown"
        } else {
            &self.label
        };

        let mut lines = vec![
            format!("[FAILED] Fetch failed after {} attempt(s)", self.attempt),
            format!("  Last error: {}", self.error_message),
            format!("  Unit: {label}"),
            "  Suggestions:".to_string(),
        ];
        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }
        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.error_class.suggestion().to_string()];
        if self.error_class.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-retries (current: {})",
                self.max_attempts.saturating_sub(1)
            ));
        }
        suggestions
    }
}

fn append_label(buffer: &mut String, label: &str) {
    if !label.is_empty() {
        buffer.push_str(" (");
        buffer.push_str(label);
        buffer.push(')');
    }
}
