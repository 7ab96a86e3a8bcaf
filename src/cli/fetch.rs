//! Fetch command implementation

use crate::cache::open_cache;
use crate::cancel::CancelHandle;
use crate::config::{
    FetchConfig, DEFAULT_BACKOFF_BASE, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_HIGH_ACTIVITY_THRESHOLD,
    DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_DELAY_SECS,
};
use crate::fetcher::{AdaptiveFetchController, FetchResult, ReviewSide};
use crate::filter::RepositoryFilter;
use crate::gateway::github::{GitHubGateway, DEFAULT_API_URL};
use crate::output::{write_records, write_records_to_path, OutputFormat};
use crate::{ActivityRecord, Period, RecordKind};
use chrono::NaiveDate;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{Cli, CliError};

/// Fetch activity records
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// GitHub login whose activity is fetched
    #[arg(long)]
    pub user: String,

    /// Record kind: commits, pull-requests, issues, reviews, events or
    /// reviewed-pull-requests
    #[arg(long)]
    pub kind: RecordKind,

    /// With reviews: return reviews others left on the user's pull requests
    #[arg(long)]
    pub received_reviews: bool,

    /// With pull-requests: add commit and line counts to each pull request
    #[arg(long)]
    pub pr_details: bool,

    /// With commits: add the user's commits on unmerged pull requests
    #[arg(long)]
    pub pr_commits: bool,

    /// Keep only repositories matching this pattern (`owner/name`, `*` and `?`
    /// wildcards); repeatable or comma-separated
    #[arg(long = "include-repo", value_name = "PATTERN", value_delimiter = ',')]
    pub include_repos: Vec<String>,

    /// Drop repositories matching this pattern; repeatable or comma-separated
    #[arg(long = "exclude-repo", value_name = "PATTERN", value_delimiter = ',')]
    pub exclude_repos: Vec<String>,

    /// Calendar period (YYYY-MM or YYYY-Qn)
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub period: Option<Period>,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    pub start: Option<NaiveDate>,

    /// Last day of the range, inclusive (YYYY-MM-DD)
    #[arg(long, requires = "start")]
    pub end: Option<NaiveDate>,

    /// Output format (json or csv)
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// Write records to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Bypass the response cache
    #[arg(long)]
    pub no_cache: bool,

    /// Record count at which a window is re-fetched day by day
    #[arg(long, default_value_t = DEFAULT_HIGH_ACTIVITY_THRESHOLD)]
    pub threshold: usize,

    /// Pause after every live call, in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_DELAY_SECS)]
    pub request_delay: f64,

    /// Retries per unit after the first attempt
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Exponential backoff base, in seconds
    #[arg(long, default_value_t = DEFAULT_BACKOFF_BASE)]
    pub backoff_base: f64,

    /// Per-call timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    pub timeout: u64,

    /// API base URL
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Exit successfully even when some units failed
    #[arg(long)]
    pub allow_partial: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl FetchArgs {
    /// Execute the fetch command
    ///
    /// Records are written even for a partial result; the partial outcome is
    /// reported afterwards as [`CliError::PartialResult`] unless
    /// `--allow-partial` was given.
    pub async fn execute(&self, cli: &Cli, cancel: CancelHandle) -> Result<(), CliError> {
        let (start, end) = self.range()?;
        self.check_kind_flags()?;
        let config = self.fetch_config()?;
        config.validate()?;

        let mut cache_config = cli.cache_config();
        cache_config.enabled = !self.no_cache;
        cache_config.validate()?;

        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)?;
        }

        let gateway = GitHubGateway::new(config.call_timeout, self.token.clone())?
            .with_base_url(self.api_url.clone());
        let controller = AdaptiveFetchController::new(Arc::new(gateway), config)?
            .with_cache(open_cache(&cache_config))
            .with_cancel(cancel);

        info!(
            user = %self.user,
            kind = %self.kind,
            start = %start,
            end = %end,
            cache = cache_config.enabled,
            "Starting fetch"
        );

        let mut result = match self.kind {
            RecordKind::Review => {
                controller
                    .fetch_reviews(&self.user, start, end, self.review_side())
                    .await?
            }
            RecordKind::Commit if self.pr_commits => {
                controller
                    .fetch_commits_with_pull_requests(&self.user, start, end)
                    .await?
            }
            kind => controller.fetch_range(kind, &self.user, start, end).await?,
        };

        let filter = RepositoryFilter::new(&self.include_repos, &self.exclude_repos);
        result.records = filter.apply(result.records);
        result.stats.records_kept = result.records.len();

        if self.pr_details {
            result = controller.fetch_pull_request_details(result).await;
        }

        self.write(&result.records)?;
        report(&result, self.allow_partial)
    }

    /// Reject kind-specific flags used with another kind
    pub fn check_kind_flags(&self) -> Result<(), CliError> {
        let misplaced = [
            (self.received_reviews, "--received-reviews", RecordKind::Review),
            (self.pr_details, "--pr-details", RecordKind::PullRequest),
            (self.pr_commits, "--pr-commits", RecordKind::Commit),
        ]
        .into_iter()
        .find(|(set, _, kind)| *set && *kind != self.kind);

        match misplaced {
            Some((_, flag, kind)) => Err(CliError::InvalidArgument(format!(
                "{flag} only applies to --kind {kind}, not {}",
                self.kind
            ))),
            None => Ok(()),
        }
    }

    fn review_side(&self) -> ReviewSide {
        if self.received_reviews {
            ReviewSide::Received
        } else {
            ReviewSide::Given
        }
    }

    /// Resolve `--period` or `--start`/`--end` into an inclusive range
    pub fn range(&self) -> Result<(NaiveDate, NaiveDate), CliError> {
        match (&self.period, self.start, self.end) {
            (Some(period), _, _) => Ok((period.start(), period.end())),
            (None, Some(start), Some(end)) => Ok((start, end)),
            _ => Err(CliError::InvalidArgument(
                "either --period or both --start and --end are required".to_string(),
            )),
        }
    }

    /// Build the controller configuration from the flags
    pub fn fetch_config(&self) -> Result<FetchConfig, CliError> {
        let request_delay = Duration::try_from_secs_f64(self.request_delay).map_err(|_| {
            CliError::InvalidArgument(format!(
                "--request-delay must be a non-negative number of seconds, got {}",
                self.request_delay
            ))
        })?;

        Ok(FetchConfig::default()
            .with_threshold(self.threshold)
            .with_request_delay(request_delay)
            .with_max_retries(self.max_retries)
            .with_backoff_base(self.backoff_base)
            .with_call_timeout(Duration::from_secs(self.timeout)))
    }

    fn write(&self, records: &[ActivityRecord]) -> Result<(), CliError> {
        match &self.output {
            Some(path) => write_records_to_path(records, self.format, path)?,
            None => {
                let stdout = std::io::stdout();
                write_records(records, self.format, stdout.lock())?;
            }
        }
        Ok(())
    }
}

fn report(result: &FetchResult, allow_partial: bool) -> Result<(), CliError> {
    for failure in &result.failures {
        warn!(failure = %failure, "Unit failed");
    }

    if !result.is_partial() {
        info!(records = result.records.len(), "Fetch complete");
        return Ok(());
    }

    if allow_partial {
        warn!(
            records = result.records.len(),
            failed_units = result.failures.len(),
            cancelled = result.cancelled,
            "Fetch incomplete, partial result allowed"
        );
        return Ok(());
    }

    Err(CliError::PartialResult {
        failed_units: result.failures.len(),
        cancelled: result.cancelled,
    })
}
