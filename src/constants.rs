//! Application constants for Media Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Overrides the webhook URL from the configuration file
    pub const WEBHOOK_URL: &str = "MEDIA_FETCHER_WEBHOOK_URL";
}

/// Failed-download ledger format and location
pub mod ledger {
    /// Default ledger file name, relative to the working directory
    pub const DEFAULT_FILE_NAME: &str = "failed-download.txt";

    /// Suffix appended to the ledger path for the reconciliation snapshot
    pub const SNAPSHOT_SUFFIX: &str = ".tmp";

    /// Field separator within a ledger line
    pub const FIELD_SEPARATOR: char = '|';

    /// Timestamp layout of the first ledger field
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Browser user agent sent with every download request
    pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 16;

    /// Default rate limit for download requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;
}

/// Retry reconciliation defaults
pub mod retry {
    use super::Duration;

    /// Default retry budget per ledger entry within one pass
    pub const DEFAULT_MAX_RETRY: u32 = 3;

    /// Back-off after an edge-provider block page is detected
    pub const PROVIDER_BLOCK_BACKOFF: Duration = Duration::from_secs(10);

    /// Body served by the edge provider when a client is rate limited
    pub const CORRUPTION_MARKER: &str = "error code: 1015";

    /// Files larger than this are never compared against the marker
    pub const MAX_MARKER_SCAN_BYTES: u64 = 4 * 1024;
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of concurrent downloads in the bulk pass
    pub const DEFAULT_WORKER_COUNT: usize = 4;

    /// Maximum recommended concurrent downloads
    pub const MAX_WORKER_COUNT: usize = 64;
}

/// Notification sink defaults
pub mod notify {
    use super::Duration;

    /// Username shown for webhook messages
    pub const DEFAULT_USERNAME: &str = "Media Fetcher";

    /// Timeout for a single webhook post
    pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

// Re-export commonly used constants for convenience
pub use http::USER_AGENT;
pub use ledger::DEFAULT_FILE_NAME as LEDGER_FILE_NAME;
pub use retry::{CORRUPTION_MARKER, DEFAULT_MAX_RETRY};
pub use workers::DEFAULT_WORKER_COUNT;
