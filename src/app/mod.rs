//! Core application logic for Media Fetcher
//!
//! The bulk pass fans jobs out over the [`DownloadExecutor`]; failures land in
//! the [`FailureLedger`]. A later [`RetryReconciler`] pass replays the ledger
//! and rewrites it with only the entries that still fail.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use media_fetcher::app::{
//!     ClientConfig, ContentValidator, DownloadExecutor, FailureLedger, HttpFetcher,
//!     NoopNotifier, ReconcilerConfig, RetryReconciler,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Arc::new(FailureLedger::open("failed-download.txt").await?);
//! let fetcher = Arc::new(HttpFetcher::new(&ClientConfig::default())?);
//! let executor = Arc::new(DownloadExecutor::new(
//!     fetcher,
//!     ContentValidator::default(),
//!     ledger.clone(),
//!     Arc::new(NoopNotifier),
//! ));
//!
//! if ledger.has_pending_entries().await? {
//!     let reconciler = RetryReconciler::new(executor, ReconcilerConfig { max_retry: 3 });
//!     let report = reconciler.reconcile().await?;
//!     println!("{}", report.summary());
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod client;
pub mod executor;
pub mod jobs;
pub mod ledger;
pub mod notifier;
pub mod reconciler;
pub mod validator;

// Re-export main public API
pub use batch::{run_batch, BatchSummary};
pub use client::{ClientConfig, Fetcher, HttpFetcher};
pub use executor::{DownloadExecutor, DownloadOutcome};
pub use jobs::{load_jobs, parse_job_line, DownloadJob};
pub use ledger::{FailureLedger, LedgerContents, LedgerEntry, LedgerSnapshot, MalformedLine};
pub use notifier::{build_notifier, notify, NoopNotifier, Notifier, WebhookNotifier};
pub use reconciler::{ReconcileReport, ReconcilerConfig, RetryReconciler};
pub use validator::{ContentStatus, ContentValidator};
