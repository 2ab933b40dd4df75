//! Bounded concurrent bulk download pass
//!
//! Jobs fan out over at most `worker_count` concurrent executor calls.
//! Failures are recorded in the ledger by the executor; the pass itself
//! never fails because individual files did.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::info;

use super::executor::{DownloadExecutor, DownloadOutcome};
use super::jobs::DownloadJob;
use crate::errors::DownloadResult;

/// Counts for one bulk pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl BatchSummary {
    fn record(&mut self, result: &DownloadResult<DownloadOutcome>) {
        match result {
            Ok(DownloadOutcome::Downloaded { bytes }) => {
                self.downloaded += 1;
                self.bytes += bytes;
            }
            Ok(DownloadOutcome::AlreadyPresent) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Download every job with bounded concurrency
///
/// `on_complete` is called once per job, in completion order.
pub async fn run_batch<F>(
    executor: Arc<DownloadExecutor>,
    jobs: Vec<DownloadJob>,
    worker_count: usize,
    mut on_complete: F,
) -> BatchSummary
where
    F: FnMut(&DownloadJob, &DownloadResult<DownloadOutcome>),
{
    let worker_count = worker_count.max(1);
    let mut summary = BatchSummary {
        total: jobs.len(),
        ..Default::default()
    };

    info!(
        "Starting bulk download of {} files with {} workers",
        jobs.len(),
        worker_count
    );

    let mut results = stream::iter(jobs)
        .map(|job| {
            let executor = Arc::clone(&executor);
            async move {
                let result = executor.download(&job.source_url, &job.store_path).await;
                (job, result)
            }
        })
        .buffer_unordered(worker_count);

    while let Some((job, result)) = results.next().await {
        summary.record(&result);
        on_complete(&job, &result);
    }

    info!(
        "Bulk download finished: {} downloaded, {} already present, {} failed",
        summary.downloaded, summary.skipped, summary.failed
    );
    summary
}
