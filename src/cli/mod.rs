//! CLI command implementations

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{CacheConfig, DEFAULT_CACHE_DIR, DEFAULT_CACHE_TTL_HOURS};

pub mod cache;
pub mod error;
pub mod fetch;

pub use cache::CacheCommand;
pub use error::CliError;
pub use fetch::FetchArgs;

/// Command line interface
#[derive(Debug, Parser)]
#[command(name = "activity-fetcher")]
#[command(about = "Fetch a GitHub user's activity history with caching and adaptive windowing", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Response cache directory
    #[arg(long, global = true, default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Cache entry lifetime in hours
    #[arg(long, global = true, default_value_t = DEFAULT_CACHE_TTL_HOURS)]
    pub cache_ttl_hours: u64,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch activity records for a user
    Fetch(FetchArgs),

    /// Inspect or clean the response cache
    Cache(CacheCommand),
}

impl Cli {
    /// Cache settings from the global flags
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_directory(&self.cache_dir)
            .with_ttl(Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600)))
    }
}
