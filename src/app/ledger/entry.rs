//! Ledger entry type and line format
//!
//! One entry is one line of the ledger file: `timestamp|storePath|sourceURL`.
//! There is no escaping, so no field may contain the separator or a line break.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::constants::ledger::{FIELD_SEPARATOR, TIMESTAMP_FORMAT};
use crate::errors::{LedgerError, LedgerResult};

/// A single failed download recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    timestamp: String,
    store_path: String,
    source_url: String,
}

impl LedgerEntry {
    /// Create an entry stamped with the current local time
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidEntry` if the path or URL is empty or
    /// contains the field separator or a line break, or if the path is not
    /// valid UTF-8
    pub fn now(store_path: impl AsRef<Path>, source_url: &str) -> LedgerResult<Self> {
        Self::with_timestamp(current_timestamp(), store_path, source_url)
    }

    /// Create an entry with an explicit timestamp
    pub fn with_timestamp(
        timestamp: impl Into<String>,
        store_path: impl AsRef<Path>,
        source_url: &str,
    ) -> LedgerResult<Self> {
        let timestamp = timestamp.into();
        let store_path = store_path
            .as_ref()
            .to_str()
            .ok_or_else(|| LedgerError::InvalidEntry {
                reason: "store path is not valid UTF-8".to_string(),
            })?
            .to_string();

        validate_field("timestamp", &timestamp)?;
        validate_field("store path", &store_path)?;
        validate_field("source URL", source_url)?;

        Ok(Self {
            timestamp,
            store_path,
            source_url: source_url.to_string(),
        })
    }

    /// Parse one ledger line (without its terminator)
    ///
    /// `line_no` is 1-based and only used for error reporting.
    pub fn parse_line(line: &str, line_no: usize) -> LedgerResult<Self> {
        let content = line.trim_end_matches(['\r', '\n']);
        let malformed = |reason: &str| LedgerError::MalformedLine {
            line: line_no,
            content: content.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = content.split(FIELD_SEPARATOR).collect();
        if fields.len() != 3 {
            return Err(malformed(&format!(
                "expected 3 fields, found {}",
                fields.len()
            )));
        }

        Self::with_timestamp(fields[0], fields[1], fields[2]).map_err(|e| match e {
            LedgerError::InvalidEntry { reason } => malformed(&reason),
            other => other,
        })
    }

    /// Same destination and source, stamped with the current time
    pub fn refreshed(&self) -> Self {
        Self {
            timestamp: current_timestamp(),
            store_path: self.store_path.clone(),
            source_url: self.source_url.clone(),
        }
    }

    /// Serialized line without terminator
    pub fn to_line(&self) -> String {
        self.to_string()
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store_path)
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.timestamp,
            self.store_path,
            self.source_url,
            sep = FIELD_SEPARATOR
        )
    }
}

/// Current local time in ledger timestamp layout
pub fn current_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn validate_field(name: &str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::InvalidEntry {
            reason: format!("{} is empty", name),
        });
    }
    if value.contains(FIELD_SEPARATOR) {
        return Err(LedgerError::InvalidEntry {
            reason: format!("{} contains '{}'", name, FIELD_SEPARATOR),
        });
    }
    if value.contains(['\r', '\n']) {
        return Err(LedgerError::InvalidEntry {
            reason: format!("{} contains a line break", name),
        });
    }
    Ok(())
}
