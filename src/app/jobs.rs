//! Job list parsing for the bulk download pass
//!
//! A job list has one `storePath|sourceURL` pair per line, the same field
//! order as the ledger minus the timestamp. Blank lines and lines starting
//! with `#` are ignored.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::constants::ledger::FIELD_SEPARATOR;
use crate::errors::{JobError, JobResult};

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub store_path: PathBuf,
    pub source_url: String,
}

impl DownloadJob {
    pub fn new(store_path: impl Into<PathBuf>, source_url: impl Into<String>) -> Self {
        Self {
            store_path: store_path.into(),
            source_url: source_url.into(),
        }
    }
}

/// Parse one job line
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn parse_job_line(line: &str, line_no: usize) -> JobResult<Option<DownloadJob>> {
    let line = line.trim();

    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let invalid = || JobError::InvalidFormat {
        line: line_no,
        content: line.to_string(),
    };

    let mut parts = line.split(FIELD_SEPARATOR);
    let store_path = parts.next().map(str::trim).filter(|s| !s.is_empty());
    let source_url = parts.next().map(str::trim).filter(|s| !s.is_empty());

    // Validate no extra parts
    if parts.next().is_some() {
        return Err(invalid());
    }

    match (store_path, source_url) {
        (Some(store_path), Some(source_url)) => {
            Ok(Some(DownloadJob::new(store_path, source_url)))
        }
        _ => Err(invalid()),
    }
}

/// Load every job from a job list file
///
/// # Errors
///
/// Returns `JobError::NotFound` if the file does not exist and
/// `JobError::InvalidFormat` for the first malformed line
pub async fn load_jobs(path: &Path) -> JobResult<Vec<DownloadJob>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(JobError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let mut jobs = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if let Some(job) = parse_job_line(line, index + 1)? {
            jobs.push(job);
        }
    }

    debug!("Loaded {} jobs from {}", jobs.len(), path.display());
    Ok(jobs)
}
