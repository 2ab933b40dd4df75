//! Command-line interface components
//!
//! This module contains CLI-specific code for the Media Fetcher application,
//! including argument parsing, command handlers and progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    Cli, Commands, ConfigAction, ConfigArgs, DownloadArgs, GlobalArgs, RetryArgs, StatusArgs,
};
pub use commands::{handle_config, handle_download, handle_retry, handle_status};
pub use progress::DownloadProgress;
