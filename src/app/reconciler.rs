//! Retry reconciliation of the failed-download ledger
//!
//! One pass runs through these stages:
//!
//! 1. **Snapshot** the live ledger to `<ledger>.tmp`.
//! 2. **Parse** the snapshot in file order, dropping blank lines and
//!    duplicate targets, and setting malformed lines aside.
//! 3. **Replay** each entry sequentially, up to `max_retry` attempts.
//!    Every failure kind consumes one attempt; an entry stops at its first
//!    success.
//! 4. **Commit**: delete the snapshot, truncate the ledger, and write back
//!    one freshly stamped entry per target that is still failing, followed
//!    by the malformed lines verbatim and by anything appended to the ledger
//!    since the snapshot was taken.
//! 5. **Report** the pass to the log and the notifier.
//!
//! Snapshot, parse and snapshot-delete failures abort the pass before the
//! live ledger is modified.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::executor::{DownloadExecutor, DownloadOutcome};
use super::ledger::{
    read_ledger_file, FailureLedger, LedgerContents, LedgerEntry, LedgerSnapshot,
};
use super::notifier::notify;
use crate::constants::retry::DEFAULT_MAX_RETRY;
use crate::errors::{DownloadError, LedgerError, LedgerResult};

/// Reconciler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Attempts per entry within one pass; values below 1 are treated as 1
    pub max_retry: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_retry: DEFAULT_MAX_RETRY,
        }
    }
}

/// Outcome counts for one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Distinct entries replayed
    pub processed: usize,
    /// Entries that downloaded or were already present
    pub resolved: usize,
    /// Entries written back to the ledger after exhausting their budget
    pub still_failing: usize,
    /// Repeated targets collapsed into their first occurrence
    pub duplicates: usize,
    /// Lines that could not be parsed and were carried over verbatim
    pub malformed: usize,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        format!(
            "Retry pass finished: {} processed, {} resolved, {} still failing, {} duplicates dropped, {} malformed lines kept",
            self.processed, self.resolved, self.still_failing, self.duplicates, self.malformed
        )
    }
}

/// Result of replaying one entry
#[derive(Debug)]
enum Replay {
    Resolved(DownloadOutcome),
    StillFailing(DownloadError),
}

/// Replays ledger entries through the download executor
#[derive(Debug, Clone)]
pub struct RetryReconciler {
    executor: Arc<DownloadExecutor>,
    config: ReconcilerConfig,
}

impl RetryReconciler {
    pub fn new(executor: Arc<DownloadExecutor>, config: ReconcilerConfig) -> Self {
        Self { executor, config }
    }

    fn ledger(&self) -> &FailureLedger {
        self.executor.ledger()
    }

    fn max_retry(&self) -> u32 {
        self.config.max_retry.max(1)
    }

    /// Run one full reconciliation pass
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Io` if the ledger cannot be snapshotted, read,
    /// truncated or rewritten, or if the snapshot cannot be deleted. Individual
    /// download failures never produce an error here.
    pub async fn reconcile(&self) -> LedgerResult<ReconcileReport> {
        info!("Retrying failed downloads, please wait...");
        let ledger = self.ledger();

        let snapshot = ledger.snapshot().await.map_err(|e| {
            error!("Failed to copy ledger {}: {}", ledger.path().display(), e);
            e
        })?;

        let contents = match read_ledger_file(snapshot.path()).await {
            Ok(contents) => contents,
            Err(e) => {
                error!("Failed to read ledger snapshot: {}", e);
                discard_snapshot(snapshot.path()).await;
                return Err(e);
            }
        };

        let (entries, duplicates) = dedupe(&contents);
        for line in &contents.malformed {
            error!(
                line = line.line_no,
                "Skipping malformed ledger line ({}): {:?}", line.reason, line.content
            );
        }

        let mut report = ReconcileReport {
            processed: entries.len(),
            duplicates,
            malformed: contents.malformed.len(),
            ..Default::default()
        };

        let mut still_failing = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            info!(
                "Retrying entry {}/{}: {}",
                index + 1,
                entries.len(),
                entry.to_line()
            );
            match self.replay(entry).await {
                Replay::Resolved(outcome) => {
                    debug!("Resolved {}: {:?}", entry.store_path().display(), outcome);
                    report.resolved += 1;
                }
                Replay::StillFailing(e) => {
                    error!(
                        path = %entry.store_path().display(),
                        url = %entry.source_url(),
                        "Retry budget of {} exhausted: {}",
                        self.max_retry(),
                        e
                    );
                    still_failing.push(entry.refreshed());
                }
            }
        }
        report.still_failing = still_failing.len();

        self.commit(&snapshot, &still_failing, &contents).await?;

        info!("{}", report.summary());
        notify(self.executor.notifier().as_ref(), &report.summary()).await;
        Ok(report)
    }

    /// Attempt one entry up to the retry budget
    async fn replay(&self, entry: &LedgerEntry) -> Replay {
        let max_retry = self.max_retry();
        let store_path = entry.store_path();
        let mut attempt = 1;

        loop {
            match self.executor.attempt(entry.source_url(), &store_path).await {
                Ok(outcome) => return Replay::Resolved(outcome),
                Err(e) if attempt >= max_retry => return Replay::StillFailing(e),
                Err(_) => {
                    let remaining = max_retry - attempt;
                    let message = format!(
                        "Retry of {} failed again, retrying ({} retries left)...",
                        store_path.display(),
                        remaining
                    );
                    warn!("{}", message);
                    notify(self.executor.notifier().as_ref(), &message).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn commit(
        &self,
        snapshot: &LedgerSnapshot,
        still_failing: &[LedgerEntry],
        contents: &LedgerContents,
    ) -> LedgerResult<()> {
        let snapshot_path = snapshot.path();

        tokio::fs::remove_file(snapshot_path).await.map_err(|e| {
            error!(
                "Failed to delete ledger snapshot {}: {}",
                snapshot_path.display(),
                e
            );
            LedgerError::io("remove snapshot", snapshot_path, e)
        })?;

        let lines = still_failing
            .iter()
            .map(|entry| entry.to_line().into_bytes())
            .chain(contents.malformed.iter().map(|line| line.raw.clone()));

        if let Err(e) = self.ledger().replace_snapshotted(snapshot, lines).await {
            for entry in still_failing {
                error!("Unrecorded failed download: {}", entry.to_line());
            }
            for line in &contents.malformed {
                error!("Unrecorded ledger line: {}", line.content);
            }
            return Err(e);
        }

        Ok(())
    }
}

/// Drop repeated `(storePath, sourceURL)` targets, keeping first occurrences
fn dedupe(contents: &LedgerContents) -> (Vec<LedgerEntry>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(contents.entries.len());

    for entry in &contents.entries {
        if seen.insert((entry.store_path(), entry.source_url().to_string())) {
            unique.push(entry.clone());
        }
    }

    let duplicates = contents.entries.len() - unique.len();
    (unique, duplicates)
}

async fn discard_snapshot(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to delete ledger snapshot {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: &str, name: &str) -> LedgerEntry {
        LedgerEntry::with_timestamp(ts, format!("/out/{}", name), &format!("http://x/{}", name))
            .unwrap()
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence_in_order() {
        let contents = LedgerContents {
            entries: vec![
                entry("2024-01-01 00:00:00", "a.mp3"),
                entry("2024-01-01 00:00:01", "b.mp3"),
                entry("2024-01-02 00:00:00", "a.mp3"),
            ],
            malformed: Vec::new(),
        };

        let (unique, duplicates) = dedupe(&contents);
        assert_eq!(duplicates, 1);
        assert_eq!(
            unique,
            vec![
                entry("2024-01-01 00:00:00", "a.mp3"),
                entry("2024-01-01 00:00:01", "b.mp3"),
            ]
        );
    }

    #[test]
    fn test_report_summary() {
        let report = ReconcileReport {
            processed: 2,
            resolved: 1,
            still_failing: 1,
            duplicates: 0,
            malformed: 0,
        };
        let summary = report.summary();
        assert!(summary.contains("2 processed"));
        assert!(summary.contains("1 still failing"));
    }
}
