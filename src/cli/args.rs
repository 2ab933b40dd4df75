//! Command-line argument parsing for Media Fetcher
//!
//! This module defines the CLI structure using clap derive macros: a bulk
//! download pass, a standalone retry pass over the failed-download ledger,
//! ledger inspection and configuration management.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Media Fetcher - bulk media downloads with a durable failure ledger
#[derive(Parser, Debug)]
#[command(
    name = "media_fetcher",
    version,
    about = "Download media files in bulk and retry failures from a persistent ledger",
    long_about = "Downloads a list of media files concurrently. Every failure is appended to a
failed-download ledger; the retry pass replays the ledger and keeps only what still fails."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Failed-download ledger path
    #[arg(long, global = true, value_name = "FILE")]
    pub ledger: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every job in a job list
    Download(DownloadArgs),

    /// Replay the failed-download ledger
    Retry(RetryArgs),

    /// Show entries currently in the failed-download ledger
    Status(StatusArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the download command
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Job list with one "storePath|sourceURL" pair per line
    #[arg(value_name = "JOBS")]
    pub jobs: PathBuf,

    /// Number of concurrent download workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Skip the retry pass after the bulk download
    #[arg(long)]
    pub no_retry: bool,

    /// Attempts per failed entry in the retry pass
    #[arg(long)]
    pub max_retry: Option<u32>,
}

/// Arguments for the retry command
#[derive(Args, Debug, Clone)]
pub struct RetryArgs {
    /// Attempts per failed entry
    #[arg(long)]
    pub max_retry: Option<u32>,
}

/// Arguments for the status command
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Print entries as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

impl DownloadArgs {
    /// Reject flag values that cannot run
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("Number of workers must be greater than 0".to_string());
        }

        if self.max_retry == Some(0) {
            return Err("--max-retry must be at least 1".to_string());
        }

        if self.no_retry && self.max_retry.is_some() {
            return Err("Cannot specify both --no-retry and --max-retry".to_string());
        }

        Ok(())
    }
}

impl RetryArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retry == Some(0) {
            return Err("--max-retry must be at least 1".to_string());
        }
        Ok(())
    }
}
