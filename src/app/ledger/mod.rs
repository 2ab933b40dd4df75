//! Failed-download ledger
//!
//! - `entry`: the `timestamp|storePath|sourceURL` line format
//! - `store`: the append-only ledger file with snapshot and truncate

pub mod entry;
pub mod store;

pub use entry::{current_timestamp, LedgerEntry};
pub use store::{read_ledger_file, FailureLedger, LedgerContents, LedgerSnapshot, MalformedLine};
