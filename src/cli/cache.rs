//! Cache maintenance commands

use crate::cache::{CacheStats, FileCache};
use clap::{Args, Subcommand};
use tracing::info;

use super::{Cli, CliError};

/// Cache subcommand
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    action: CacheAction,
}

/// Cache actions
#[derive(Debug, Subcommand)]
enum CacheAction {
    /// Show entry counts and sizes
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Delete every entry
    Clear,
    /// Delete expired and unreadable entries
    Prune,
}

impl CacheCommand {
    /// Execute the cache command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.cache_config();
        let cache = FileCache::new(&config.directory, config.ttl);

        match &self.action {
            CacheAction::Stats { json } => {
                let stats = cache.stats()?;
                if *json {
                    let text = serde_json::to_string_pretty(&stats)
                        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
                    println!("{text}");
                } else {
                    print!("{}", format_stats(&stats));
                }
            }
            CacheAction::Clear => {
                let removed = cache.clear()?;
                info!(directory = %config.directory.display(), removed, "Cache cleared");
                println!("Removed {removed} cache entries");
            }
            CacheAction::Prune => {
                let removed = cache.prune_expired()?;
                info!(directory = %config.directory.display(), removed, "Cache pruned");
                println!("Removed {removed} expired cache entries");
            }
        }
        Ok(())
    }
}

fn format_stats(stats: &CacheStats) -> String {
    format!(
        "Cache directory: {}\nTTL: {}h\nEntries: {} ({} valid, {} expired)\nSize: {} bytes\n",
        stats.directory.display(),
        stats.ttl_secs / 3600,
        stats.total_entries,
        stats.valid_entries,
        stats.expired_entries,
        stats.total_bytes
    )
}
