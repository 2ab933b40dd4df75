//! Single-file download execution
//!
//! `DownloadExecutor::attempt` performs one fetch-to-disk with no ledger side
//! effects; the reconciler drives it directly. `DownloadExecutor::download`
//! wraps an attempt for the bulk pass and records failures in the ledger.
//!
//! Whatever the failure, the destination path is left empty: partial bodies
//! and block pages are removed so they never pass a later existence check.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::client::Fetcher;
use super::ledger::{FailureLedger, LedgerEntry};
use super::notifier::{notify, Notifier};
use super::validator::{ContentStatus, ContentValidator};
use crate::errors::{DownloadError, DownloadResult};

/// Successful result of a download attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The body was fetched and written
    Downloaded { bytes: u64 },
    /// A valid file was already present; nothing was fetched
    AlreadyPresent,
}

/// Fetches files to disk and cleans up after failures
#[derive(Debug, Clone)]
pub struct DownloadExecutor {
    fetcher: Arc<dyn Fetcher>,
    validator: ContentValidator,
    ledger: Arc<FailureLedger>,
    notifier: Arc<dyn Notifier>,
}

impl DownloadExecutor {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        validator: ContentValidator,
        ledger: Arc<FailureLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fetcher,
            validator,
            ledger,
            notifier,
        }
    }

    pub fn ledger(&self) -> &Arc<FailureLedger> {
        &self.ledger
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn validator(&self) -> &ContentValidator {
        &self.validator
    }

    /// Download for the bulk pass
    ///
    /// On failure the attempt is appended to the ledger. A ledger write error
    /// is logged; it does not replace the download error returned.
    pub async fn download(&self, url: &str, destination: &Path) -> DownloadResult<DownloadOutcome> {
        let result = self.attempt(url, destination).await;

        if let Err(ref e) = result {
            self.record_failure(url, destination, e).await;
        }

        result
    }

    /// One fetch-to-disk attempt without ledger side effects
    ///
    /// 1. A valid file already at `destination` short-circuits to `AlreadyPresent`;
    ///    a block page there is removed first.
    /// 2. The parent directory is created if needed.
    /// 3. The primary fetch runs; a `ContentLengthMismatch` falls back to a plain fetch.
    /// 4. The written file is checked for the provider block page.
    ///
    /// Every failure is logged and sent to the notifier once. A block page
    /// additionally sleeps the validator's back-off before returning.
    pub async fn attempt(&self, url: &str, destination: &Path) -> DownloadResult<DownloadOutcome> {
        let result = self.run_attempt(url, destination).await;

        match &result {
            Ok(DownloadOutcome::Downloaded { bytes }) => {
                info!("Downloaded {} ({} bytes)", destination.display(), bytes);
            }
            Ok(DownloadOutcome::AlreadyPresent) => {
                info!("Already downloaded, skipping: {}", destination.display());
            }
            Err(DownloadError::ProviderBlocked { .. }) => {
                let message = format!(
                    "File {} hit the provider block page, backing off {}s before retrying",
                    destination.display(),
                    self.validator.backoff().as_secs()
                );
                error!(path = %destination.display(), url = %url, "{}", message);
                notify(self.notifier.as_ref(), &message).await;
                self.validator.back_off().await;
            }
            Err(e) => {
                error!(
                    path = %destination.display(),
                    url = %url,
                    kind = %e.kind(),
                    "Download failed: {}",
                    e
                );
                let message = format!("File {} failed to download: {}", destination.display(), e);
                notify(self.notifier.as_ref(), &message).await;
            }
        }

        result
    }

    async fn run_attempt(&self, url: &str, destination: &Path) -> DownloadResult<DownloadOutcome> {
        match self.validator.inspect(destination).await? {
            ContentStatus::Valid => return Ok(DownloadOutcome::AlreadyPresent),
            ContentStatus::Blocked => {
                warn!(
                    "Removing provider block page left at {}",
                    destination.display()
                );
                tokio::fs::remove_file(destination)
                    .await
                    .map_err(|e| DownloadError::write(destination, e))?;
            }
            ContentStatus::Missing => {}
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::write(parent, e))?;
        }

        let fetched = match self.fetcher.fetch(url, destination).await {
            Err(e @ DownloadError::ContentLengthMismatch { .. }) => {
                warn!("{}; retrying with a plain GET", e);
                remove_partial(destination).await;
                self.fetcher.fetch_plain(url, destination).await
            }
            other => other,
        };

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_partial(destination).await;
                return Err(e);
            }
        };

        if let Err(e) = self.validator.check(destination).await {
            remove_partial(destination).await;
            return Err(e);
        }

        Ok(DownloadOutcome::Downloaded { bytes })
    }

    async fn record_failure(&self, url: &str, destination: &Path, error: &DownloadError) {
        let entry = match LedgerEntry::now(destination, url) {
            Ok(entry) => entry,
            Err(e) => {
                error!(
                    path = %destination.display(),
                    url = %url,
                    "Cannot record failure ({}) in ledger: {}",
                    error,
                    e
                );
                return;
            }
        };

        if let Err(e) = self.ledger.append(&entry).await {
            error!(
                path = %destination.display(),
                url = %url,
                "Failed to append to ledger: {}",
                e
            );
        }
    }
}

/// Remove whatever a failed attempt left at `path`
async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!("Removed partial file: {}", path.display());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            error!("Failed to remove partial file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::notifier::NoopNotifier;
    use crate::errors::NotifyResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// What the scripted fetcher should do on a call
    #[derive(Debug, Clone)]
    enum Step {
        Write(&'static [u8]),
        PartialThenNetwork,
        PartialThenMismatch,
        WriteFailure,
    }

    #[derive(Debug)]
    struct ScriptedFetcher {
        primary: Step,
        plain: Step,
        calls: AtomicUsize,
        plain_calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(primary: Step, plain: Step) -> Self {
            Self {
                primary,
                plain,
                calls: AtomicUsize::new(0),
                plain_calls: AtomicUsize::new(0),
            }
        }

        async fn run(step: &Step, url: &str, destination: &Path) -> DownloadResult<u64> {
            match step {
                Step::Write(body) => {
                    tokio::fs::write(destination, body).await.unwrap();
                    Ok(body.len() as u64)
                }
                Step::PartialThenNetwork => {
                    tokio::fs::write(destination, b"part").await.unwrap();
                    Err(DownloadError::network(url, "connection reset"))
                }
                Step::PartialThenMismatch => {
                    tokio::fs::write(destination, b"part").await.unwrap();
                    Err(DownloadError::ContentLengthMismatch {
                        url: url.to_string(),
                        expected: 100,
                        received: 4,
                    })
                }
                Step::WriteFailure => {
                    tokio::fs::write(destination, b"").await.unwrap();
                    Err(DownloadError::write(
                        destination,
                        std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                    ))
                }
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, destination: &Path) -> DownloadResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Self::run(&self.primary, url, destination).await
        }

        async fn fetch_plain(&self, url: &str, destination: &Path) -> DownloadResult<u64> {
            self.plain_calls.fetch_add(1, Ordering::SeqCst);
            Self::run(&self.plain, url, destination).await
        }
    }

    #[derive(Debug, Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &str) -> NotifyResult<()> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    async fn setup(
        fetcher: ScriptedFetcher,
    ) -> (TempDir, Arc<ScriptedFetcher>, Arc<RecordingNotifier>, DownloadExecutor) {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Arc::new(
            FailureLedger::open(temp_dir.path().join("failed-download.txt"))
                .await
                .unwrap(),
        );
        let fetcher = Arc::new(fetcher);
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = DownloadExecutor::new(
            fetcher.clone(),
            ContentValidator::new("error code: 1015", Duration::ZERO),
            ledger,
            notifier.clone(),
        );
        (temp_dir, fetcher, notifier, executor)
    }

    #[tokio::test]
    async fn test_successful_download() {
        let (temp_dir, _, notifier, executor) =
            setup(ScriptedFetcher::new(Step::Write(b"audio"), Step::Write(b""))).await;
        let destination = temp_dir.path().join("out").join("a.mp3");

        let outcome = executor.download("http://x/a.mp3", &destination).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Downloaded { bytes: 5 });
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"audio");
        assert!(!executor.ledger().has_pending_entries().await.unwrap());
        assert!(notifier.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_file_is_skipped() {
        let (temp_dir, fetcher, _, executor) =
            setup(ScriptedFetcher::new(Step::Write(b"new"), Step::Write(b""))).await;
        let destination = temp_dir.path().join("a.mp3");
        tokio::fs::write(&destination, b"old audio").await.unwrap();

        let outcome = executor.download("http://x/a.mp3", &destination).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::AlreadyPresent);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"old audio");
    }

    #[tokio::test]
    async fn test_existing_block_page_is_refetched() {
        let (temp_dir, fetcher, _, executor) =
            setup(ScriptedFetcher::new(Step::Write(b"audio"), Step::Write(b""))).await;
        let destination = temp_dir.path().join("a.mp3");
        tokio::fs::write(&destination, b"error code: 1015").await.unwrap();

        let outcome = executor.download("http://x/a.mp3", &destination).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Downloaded { bytes: 5 });
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_network_failure_cleans_up_and_records() {
        let (temp_dir, _, notifier, executor) = setup(ScriptedFetcher::new(
            Step::PartialThenNetwork,
            Step::Write(b""),
        ))
        .await;
        let destination = temp_dir.path().join("a.mp3");

        let err = executor.download("http://x/a.mp3", &destination).await.unwrap_err();
        assert!(matches!(err, DownloadError::Network { .. }));
        assert!(!destination.exists());

        let contents = executor.ledger().read().await.unwrap();
        assert_eq!(contents.entries.len(), 1);
        assert_eq!(contents.entries[0].store_path(), destination);
        assert_eq!(contents.entries[0].source_url(), "http://x/a.mp3");
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_directory_at_destination_is_recorded_not_skipped() {
        let (temp_dir, fetcher, _, executor) =
            setup(ScriptedFetcher::new(Step::Write(b"audio"), Step::Write(b""))).await;
        let destination = temp_dir.path().join("a.mp3");
        tokio::fs::create_dir(&destination).await.unwrap();

        let err = executor.download("http://x/a.mp3", &destination).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::FailureKind::Write);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(destination.is_dir());

        let contents = executor.ledger().read().await.unwrap();
        assert_eq!(contents.entries.len(), 1);
        assert_eq!(contents.entries[0].store_path(), destination);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_no_zero_byte_file() {
        let (temp_dir, _, _, executor) =
            setup(ScriptedFetcher::new(Step::WriteFailure, Step::Write(b""))).await;
        let destination = temp_dir.path().join("a.mp3");

        let err = executor.download("http://x/a.mp3", &destination).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::FailureKind::Write);
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_length_mismatch_falls_back_to_plain_fetch() {
        let (temp_dir, fetcher, _, executor) = setup(ScriptedFetcher::new(
            Step::PartialThenMismatch,
            Step::Write(b"full body"),
        ))
        .await;
        let destination = temp_dir.path().join("a.mp3");

        let outcome = executor.download("http://x/a.mp3", &destination).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Downloaded { bytes: 9 });
        assert_eq!(fetcher.plain_calls.load(Ordering::SeqCst), 1);
        assert!(!executor.ledger().has_pending_entries().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_fallback_is_recorded() {
        let (temp_dir, _, _, executor) = setup(ScriptedFetcher::new(
            Step::PartialThenMismatch,
            Step::PartialThenNetwork,
        ))
        .await;
        let destination = temp_dir.path().join("a.mp3");

        let err = executor.download("http://x/a.mp3", &destination).await.unwrap_err();
        assert!(matches!(err, DownloadError::Network { .. }));
        assert!(!destination.exists());
        assert!(executor.ledger().has_pending_entries().await.unwrap());
    }

    #[tokio::test]
    async fn test_block_page_download_is_removed() {
        let (temp_dir, _, notifier, executor) = setup(ScriptedFetcher::new(
            Step::Write(b"error code: 1015"),
            Step::Write(b""),
        ))
        .await;
        let destination = temp_dir.path().join("a.mp3");

        let err = executor.download("http://x/a.mp3", &destination).await.unwrap_err();
        assert!(matches!(err, DownloadError::ProviderBlocked { .. }));
        assert!(!destination.exists());
        assert!(executor.ledger().has_pending_entries().await.unwrap());
        assert!(notifier.messages.lock().unwrap()[0].contains("block page"));
    }

    #[tokio::test]
    async fn test_attempt_does_not_touch_ledger() {
        let (temp_dir, _, _, executor) = setup(ScriptedFetcher::new(
            Step::PartialThenNetwork,
            Step::Write(b""),
        ))
        .await;
        let destination = temp_dir.path().join("a.mp3");

        assert!(executor.attempt("http://x/a.mp3", &destination).await.is_err());
        assert!(!executor.ledger().has_pending_entries().await.unwrap());
    }

    #[tokio::test]
    async fn test_unrecordable_failure_still_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Arc::new(
            FailureLedger::open(temp_dir.path().join("failed-download.txt"))
                .await
                .unwrap(),
        );
        let executor = DownloadExecutor::new(
            Arc::new(ScriptedFetcher::new(Step::PartialThenNetwork, Step::Write(b""))),
            ContentValidator::new("error code: 1015", Duration::ZERO),
            ledger,
            Arc::new(NoopNotifier),
        );

        // A `|` in the URL cannot be represented in the ledger
        let destination = temp_dir.path().join("a.mp3");
        let result = executor.download("http://x/a|b.mp3", &destination).await;
        assert!(result.is_err());
        assert!(!executor.ledger().has_pending_entries().await.unwrap());
    }
}
