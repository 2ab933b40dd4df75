//! Configuration management for Media Fetcher
//!
//! Configuration is layered: built-in defaults, then a TOML file, then
//! environment variables, then CLI flags (applied by the command handlers).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{ClientConfig, ContentValidator, ReconcilerConfig};
use crate::constants::{env, http, ledger, logging, notify, retry, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Failed-download ledger settings
    pub ledger: LedgerConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Bulk download settings
    pub download: DownloadConfigToml,
    /// Retry reconciliation settings
    pub retry: RetryConfigToml,
    /// Notification sink settings
    pub notifier: NotifierConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Ledger location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfigToml {
    /// Ledger file path
    pub path: PathBuf,
}

impl Default for LedgerConfigToml {
    fn default() -> Self {
        Self {
            path: PathBuf::from(ledger::DEFAULT_FILE_NAME),
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfigToml {
    /// User agent for download requests
    pub user_agent: String,
    /// Request timeout in seconds (0 = no timeout)
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            user_agent: http::USER_AGENT.to_string(),
            request_timeout_secs: 0,
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            rate_limit_rps: http::DEFAULT_RATE_LIMIT_RPS,
        }
    }
}

/// Bulk download settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfigToml {
    /// Number of concurrent downloads
    pub worker_count: usize,
    /// Run a retry pass after the bulk pass when failures were recorded
    pub auto_retry: bool,
}

impl Default for DownloadConfigToml {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            auto_retry: true,
        }
    }
}

/// Retry reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfigToml {
    /// Attempts per ledger entry within one pass
    pub max_retry: u32,
    /// Sleep after a provider block page, in seconds
    pub provider_block_backoff_secs: u64,
    /// Exact body of the provider block page
    pub corruption_marker: String,
}

impl Default for RetryConfigToml {
    fn default() -> Self {
        Self {
            max_retry: retry::DEFAULT_MAX_RETRY,
            provider_block_backoff_secs: retry::PROVIDER_BLOCK_BACKOFF.as_secs(),
            corruption_marker: retry::CORRUPTION_MARKER.to_string(),
        }
    }
}

/// Notification sink settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifierConfigToml {
    /// Webhook URL (empty = notifications disabled)
    pub webhook_url: String,
    /// Username shown on webhook messages
    pub username: String,
    /// Webhook request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NotifierConfigToml {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            username: notify::DEFAULT_USERNAME.to_string(),
            timeout_secs: notify::WEBHOOK_TIMEOUT.as_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (if exists)
    /// 3. Environment variables
    ///
    /// CLI flags are applied on top by the command handlers.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        let config_path = match config_file_override {
            Some(ref path) => Some(path.clone()),
            None => Self::find_config_file(),
        };

        if let Some(path) = config_path {
            if path.exists() {
                config = Self::load_from_file(&path).await?;
            } else if config_file_override.is_some() {
                return Err(ConfigError::NotFound { path });
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(env::WEBHOOK_URL) {
            debug!("Using webhook URL from {}", env::WEBHOOK_URL);
            self.notifier.webhook_url = url;
        }
    }

    /// Reject values the application cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retry.max_retry == 0 {
            return Err(invalid("retry.max_retry", "0", "Must be at least 1"));
        }
        if self.download.worker_count == 0 {
            return Err(invalid("download.worker_count", "0", "Must be at least 1"));
        }
        if self.download.worker_count > workers::MAX_WORKER_COUNT {
            return Err(invalid(
                "download.worker_count",
                &self.download.worker_count.to_string(),
                &format!("Must be at most {}", workers::MAX_WORKER_COUNT),
            ));
        }
        if self.client.rate_limit_rps == 0 {
            return Err(invalid("client.rate_limit_rps", "0", "Must be at least 1"));
        }
        if self.retry.corruption_marker.trim().is_empty() {
            return Err(invalid(
                "retry.corruption_marker",
                "\"\"",
                "Marker must not be empty",
            ));
        }
        if self.ledger.path.as_os_str().is_empty() {
            return Err(invalid("ledger.path", "\"\"", "Path must not be empty"));
        }
        Ok(())
    }

    /// Runtime HTTP client configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            user_agent: self.client.user_agent.clone(),
            request_timeout: match self.client.request_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            connect_timeout: Duration::from_secs(self.client.connect_timeout_secs),
            rate_limit_rps: self.client.rate_limit_rps,
            ..ClientConfig::default()
        }
    }

    /// Content validator built from the retry section
    pub fn validator(&self) -> ContentValidator {
        ContentValidator::new(
            self.retry.corruption_marker.clone(),
            Duration::from_secs(self.retry.provider_block_backoff_secs),
        )
    }

    /// Reconciler configuration
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            max_retry: self.retry.max_retry,
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from("./media-fetcher.toml")];
        if let Some(path) = Self::default_config_path() {
            search_paths.push(path);
        }

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }

        debug!("No config file found in standard locations");
        None
    }

    /// Default config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("media-fetcher").join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        let config: AppConfig = toml::from_str(&content)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Write the commented default configuration to `path`
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub async fn write_default(path: &Path, force: bool) -> ConfigResult<()> {
        if path.exists() && !force {
            return Err(invalid(
                "config",
                &path.display().to_string(),
                "File already exists; use --force to overwrite",
            ));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        tokio::fs::write(path, Self::generate_default_config_content())
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        info!("Wrote default configuration to {}", path.display());
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_else(|e| format!("# failed to render: {}", e))
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# Media Fetcher Configuration
# Every setting is optional; missing values fall back to these defaults.

[ledger]
# Failed-download ledger, one "timestamp|storePath|sourceURL" line per failure
path = "{ledger_path}"

[client]
user_agent = "{user_agent}"
request_timeout_secs = 0  # 0 = no timeout
connect_timeout_secs = {connect_timeout}
rate_limit_rps = {rate_limit}

[download]
worker_count = {workers}
auto_retry = true  # Retry recorded failures after the bulk pass

[retry]
max_retry = {max_retry}
provider_block_backoff_secs = {backoff}
corruption_marker = "{marker}"

[notifier]
# Discord-compatible webhook; empty disables notifications.
# The {webhook_env} environment variable overrides this value.
webhook_url = ""
username = "{username}"
timeout_secs = {notify_timeout}

[logging]
level = "{log_level}"  # error, warn, info, debug, trace
"#,
            ledger_path = ledger::DEFAULT_FILE_NAME,
            user_agent = http::USER_AGENT,
            connect_timeout = http::CONNECT_TIMEOUT.as_secs(),
            rate_limit = http::DEFAULT_RATE_LIMIT_RPS,
            workers = workers::DEFAULT_WORKER_COUNT,
            max_retry = retry::DEFAULT_MAX_RETRY,
            backoff = retry::PROVIDER_BLOCK_BACKOFF.as_secs(),
            marker = retry::CORRUPTION_MARKER,
            webhook_env = env::WEBHOOK_URL,
            username = notify::DEFAULT_USERNAME,
            notify_timeout = notify::WEBHOOK_TIMEOUT.as_secs(),
            log_level = logging::DEFAULT_LOG_LEVEL,
        )
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
