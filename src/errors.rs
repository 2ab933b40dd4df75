//! Error types for Media Fetcher
//!
//! Errors are split by component so that per-file download failures can be
//! told apart from ledger infrastructure failures. Only the latter abort a
//! reconciliation pass.

use std::path::PathBuf;
use thiserror::Error;

/// Classification of a single failed download attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Connection or transport failure, including non-success HTTP status
    Network,
    /// Body length disagreed with the advertised Content-Length
    ContentLengthMismatch,
    /// Edge provider served a block page with a success status
    ProviderBlocked,
    /// Local disk failure while writing the destination
    Write,
}

impl FailureKind {
    /// Short label used in logs and notifications
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::ContentLengthMismatch => "content-length-mismatch",
            FailureKind::ProviderBlocked => "provider-blocked",
            FailureKind::Write => "write",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single fetch-to-disk operation
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport-level failure (connection, TLS, HTTP status, body stream)
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    /// The provider reported a length that the body did not match
    #[error("Content-Length mismatch for {url}: expected {expected} bytes, received {received} bytes")]
    ContentLengthMismatch {
        url: String,
        expected: u64,
        received: u64,
    },

    /// HTTP 200 response whose body is the edge provider's block page
    #[error("Provider block page received instead of content: {path}")]
    ProviderBlocked { path: PathBuf },

    /// Destination could not be created or written
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source URL could not be parsed
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl DownloadError {
    /// Build a network error from any displayable transport error
    pub fn network(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a write error for the given destination
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Failure class of this error
    ///
    /// An unparseable URL can never succeed through the transport, but it is
    /// reported in the network class since no bytes reach the disk.
    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::Network { .. } | DownloadError::InvalidUrl { .. } => {
                FailureKind::Network
            }
            DownloadError::ContentLengthMismatch { .. } => FailureKind::ContentLengthMismatch,
            DownloadError::ProviderBlocked { .. } => FailureKind::ProviderBlocked,
            DownloadError::Write { .. } => FailureKind::Write,
        }
    }

    /// Whether a later attempt has a reasonable chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DownloadError::Network { .. }
                | DownloadError::ContentLengthMismatch { .. }
                | DownloadError::ProviderBlocked { .. }
        )
    }
}

/// Failed-download ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Ledger or snapshot file could not be read, copied, written or truncated
    #[error("Ledger {operation} failed for {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A ledger line did not have the `timestamp|storePath|sourceURL` shape
    #[error("Malformed ledger line {line}: {reason} ({content:?})")]
    MalformedLine {
        line: usize,
        content: String,
        reason: String,
    },

    /// Entry fields violate the ledger format invariants
    #[error("Invalid ledger entry: {reason}")]
    InvalidEntry { reason: String },
}

impl LedgerError {
    pub(crate) fn io(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Notification sink errors
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Webhook request failed
    #[error("Webhook request failed")]
    Http(#[from] reqwest::Error),

    /// Webhook endpoint answered with a non-success status
    #[error("Webhook returned HTTP {status}")]
    Status { status: u16 },
}

/// Job list parsing errors
#[derive(Error, Debug)]
pub enum JobError {
    /// Job list file not found
    #[error("Job list not found: {path}")]
    NotFound { path: PathBuf },

    /// A line did not have the `storePath|sourceURL` shape
    #[error("Invalid job list format at line {line}: {content}")]
    InvalidFormat { line: usize, content: String },

    /// I/O error reading the job list
    #[error("I/O error reading job list")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration file could not be read or written
    #[error("Configuration file I/O failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Ledger error
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Notification error
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Job list error
    #[error(transparent)]
    Jobs(#[from] JobError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(e) => e.is_transient(),
            AppError::Notify(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Download(_) => "download",
            AppError::Ledger(_) => "ledger",
            AppError::Notify(_) => "notify",
            AppError::Jobs(_) => "jobs",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Ledger result type alias
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Notification result type alias
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Job list result type alias
pub type JobResult<T> = std::result::Result<T, JobError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
