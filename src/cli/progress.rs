//! Progress display for the bulk download pass
//!
//! Draws an indicatif bar when stderr is a terminal and falls back to
//! periodic log lines otherwise.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::app::{DownloadJob, DownloadOutcome};
use crate::errors::DownloadResult;

/// Log a text progress line every this many completed files
const TEXT_REPORT_INTERVAL: u64 = 50;

/// Progress reporter for one bulk pass
#[derive(Debug)]
pub struct DownloadProgress {
    bar: Option<ProgressBar>,
    total: u64,
    completed: u64,
    failed: u64,
}

impl DownloadProgress {
    /// Create a reporter for `total` jobs
    ///
    /// The bar is only drawn when `enabled` is set and stderr is a terminal.
    pub fn new(total: usize, enabled: bool) -> Self {
        let total = total as u64;
        let bar = (enabled && atty::is(atty::Stream::Stderr)).then(|| {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (ETA: {eta}) {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##-"),
            );
            bar.enable_steady_tick(std::time::Duration::from_millis(100));
            bar
        });

        Self {
            bar,
            total,
            completed: 0,
            failed: 0,
        }
    }

    /// Record one finished job
    pub fn record(&mut self, job: &DownloadJob, result: &DownloadResult<DownloadOutcome>) {
        self.completed += 1;
        if result.is_err() {
            self.failed += 1;
        }

        match &self.bar {
            Some(bar) => {
                bar.set_position(self.completed);
                let name = job
                    .store_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if self.failed > 0 {
                    bar.set_message(format!("{} failed | {}", self.failed, name));
                } else {
                    bar.set_message(name);
                }
            }
            None => {
                if self.completed % TEXT_REPORT_INTERVAL == 0 || self.completed == self.total {
                    info!(
                        "Progress: {}/{} files ({} failed)",
                        self.completed, self.total, self.failed
                    );
                }
            }
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(format!("done, {} failed", self.failed));
        }
    }
}
