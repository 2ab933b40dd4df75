//! Content validation for downloaded files
//!
//! Some edge providers answer a rate-limited request with HTTP 200 and a short
//! text body such as `error code: 1015`. The transport layer sees a perfectly
//! good response, so the only way to notice is to look at what landed on disk.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::constants::retry::{CORRUPTION_MARKER, MAX_MARKER_SCAN_BYTES, PROVIDER_BLOCK_BACKOFF};
use crate::errors::{DownloadError, DownloadResult};

/// What is currently at a destination path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStatus {
    /// Nothing at the destination
    Missing,
    /// A file that is not the provider block page
    Valid,
    /// The provider block page
    Blocked,
}

/// Detects provider block pages in downloaded files
#[derive(Debug, Clone)]
pub struct ContentValidator {
    marker: String,
    backoff: Duration,
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(CORRUPTION_MARKER, PROVIDER_BLOCK_BACKOFF)
    }
}

impl ContentValidator {
    /// Create a validator for `marker` that backs off for `backoff` on detection
    pub fn new(marker: impl Into<String>, backoff: Duration) -> Self {
        Self {
            marker: marker.into(),
            backoff,
        }
    }

    /// Back-off applied after a block page is detected
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Classify whatever is at `path`
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Write` if an existing file cannot be read, or
    /// if the destination exists but is not a regular file
    pub async fn inspect(&self, path: &Path) -> DownloadResult<ContentStatus> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ContentStatus::Missing)
            }
            Err(e) => return Err(DownloadError::write(path, e)),
        };

        if !metadata.is_file() {
            return Err(DownloadError::write(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "destination exists but is not a regular file",
                ),
            ));
        }
        if metadata.len() > MAX_MARKER_SCAN_BYTES {
            return Ok(ContentStatus::Valid);
        }

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| DownloadError::write(path, e))?;
        let mut content = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut content)
            .await
            .map_err(|e| DownloadError::write(path, e))?;

        if self.is_marker(&content) {
            debug!("Provider block page found at {}", path.display());
            Ok(ContentStatus::Blocked)
        } else {
            Ok(ContentStatus::Valid)
        }
    }

    /// Fail with `ProviderBlocked` if `path` holds the block page
    pub async fn check(&self, path: &Path) -> DownloadResult<()> {
        match self.inspect(path).await? {
            ContentStatus::Blocked => Err(DownloadError::ProviderBlocked {
                path: path.to_path_buf(),
            }),
            ContentStatus::Missing | ContentStatus::Valid => Ok(()),
        }
    }

    /// Sleep for the configured back-off
    pub async fn back_off(&self) {
        if !self.backoff.is_zero() {
            tokio::time::sleep(self.backoff).await;
        }
    }

    fn is_marker(&self, content: &[u8]) -> bool {
        match std::str::from_utf8(content) {
            Ok(text) => text.trim_end() == self.marker,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn validator() -> ContentValidator {
        ContentValidator::new(CORRUPTION_MARKER, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_marker_content_is_blocked() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp3");
        tokio::fs::write(&path, "error code: 1015").await.unwrap();

        assert_eq!(
            validator().inspect(&path).await.unwrap(),
            ContentStatus::Blocked
        );
        let err = validator().check(&path).await.unwrap_err();
        assert!(matches!(err, DownloadError::ProviderBlocked { .. }));
    }

    #[tokio::test]
    async fn test_marker_with_trailing_newline_is_blocked() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp3");
        tokio::fs::write(&path, "error code: 1015\n").await.unwrap();

        assert_eq!(
            validator().inspect(&path).await.unwrap(),
            ContentStatus::Blocked
        );
    }

    #[tokio::test]
    async fn test_other_content_is_valid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp3");

        let contents: [&[u8]; 4] = [
            b"ID3\x04\x00\x00\x00\x00",
            b"error code: 1020",
            b"prefix error code: 1015",
            b"",
        ];
        for content in contents {
            tokio::fs::write(&path, content).await.unwrap();
            assert_eq!(
                validator().inspect(&path).await.unwrap(),
                ContentStatus::Valid
            );
            assert!(validator().check(&path).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.mp3");

        assert_eq!(
            validator().inspect(&path).await.unwrap(),
            ContentStatus::Missing
        );
        assert!(validator().check(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_directory_at_destination_is_write_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp3");
        tokio::fs::create_dir(&path).await.unwrap();

        let err = validator().inspect(&path).await.unwrap_err();
        assert!(matches!(err, DownloadError::Write { .. }));
        assert!(validator().check(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_large_file_is_not_scanned() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.mp3");
        let mut content = b"error code: 1015".to_vec();
        content.extend(std::iter::repeat(b' ').take(MAX_MARKER_SCAN_BYTES as usize));
        tokio::fs::write(&path, content).await.unwrap();

        assert_eq!(
            validator().inspect(&path).await.unwrap(),
            ContentStatus::Valid
        );
    }

    #[tokio::test]
    async fn test_custom_marker() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp3");
        tokio::fs::write(&path, "blocked").await.unwrap();

        let validator = ContentValidator::new("blocked", Duration::ZERO);
        assert_eq!(validator.inspect(&path).await.unwrap(), ContentStatus::Blocked);
    }

    #[tokio::test]
    async fn test_back_off_sleeps_configured_duration() {
        let validator = ContentValidator::new(CORRUPTION_MARKER, Duration::from_millis(20));
        let start = std::time::Instant::now();
        validator.back_off().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
