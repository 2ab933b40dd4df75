//! Media Fetcher Library
//!
//! Concurrent bulk downloading of media files with a durable failed-download
//! ledger. Failures are appended to the ledger as they happen; a retry pass
//! replays the ledger with a bounded per-entry budget and rewrites it with
//! only the entries that still fail.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
