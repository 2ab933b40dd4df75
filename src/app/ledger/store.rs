//! Durable failed-download ledger
//!
//! The ledger is a single append-only text file owned by the process for
//! the duration of a run. All writes go through one mutex-guarded handle so
//! that concurrent download tasks never interleave partial lines.
//!
//! Reads work on raw bytes and decode each line separately, so one corrupt
//! line (for example a multi-byte character cut by a crash mid-write) is
//! reported on its own instead of failing the whole file.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::entry::LedgerEntry;
use crate::constants::ledger::SNAPSHOT_SUFFIX;
use crate::errors::{LedgerError, LedgerResult};

/// Ledger line that could not be parsed into an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number in the file it was read from
    pub line_no: usize,
    /// Line content without terminator, lossily decoded for display
    pub content: String,
    /// Exact bytes of the line, written back unchanged
    pub raw: Vec<u8>,
    /// Why parsing failed
    pub reason: String,
}

/// Parsed contents of a ledger or snapshot file, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerContents {
    pub entries: Vec<LedgerEntry>,
    pub malformed: Vec<MalformedLine>,
}

impl LedgerContents {
    /// Number of non-empty lines read
    pub fn line_count(&self) -> usize {
        self.entries.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line_count() == 0
    }
}

/// A copy of the ledger taken for one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    path: PathBuf,
    copied_len: u64,
}

impl LedgerSnapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the live ledger at the moment it was copied
    pub fn copied_len(&self) -> u64 {
        self.copied_len
    }
}

/// The failed-download ledger file
#[derive(Debug)]
pub struct FailureLedger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FailureLedger {
    /// Open the ledger at `path`, creating it if absent
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Io` if the file cannot be opened for appending
    pub async fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::io("create directory", parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| LedgerError::io("open", &path, e))?;

        debug!("Opened failed-download ledger: {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the live ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path used for the reconciliation snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(SNAPSHOT_SUFFIX);
        PathBuf::from(name)
    }

    /// Append one entry as a single line
    ///
    /// Safe to call from many tasks at once; writes are serialized.
    pub async fn append(&self, entry: &LedgerEntry) -> LedgerResult<()> {
        self.append_lines(std::iter::once(entry.to_line())).await
    }

    /// Append raw lines verbatim, one per item
    pub(crate) async fn append_lines<I, B>(&self, lines: I) -> LedgerResult<()>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let buffer = join_lines(lines);
        if buffer.is_empty() {
            return Ok(());
        }

        let mut file = self.file.lock().await;
        write_flushed(&mut file, &buffer)
            .await
            .map_err(|e| LedgerError::io("append", &self.path, e))
    }

    /// Copy the ledger to its snapshot path, preserving permissions
    ///
    /// Appends are blocked while the copy runs so the snapshot never ends
    /// with a half-written line from this process.
    pub async fn snapshot(&self) -> LedgerResult<LedgerSnapshot> {
        let snapshot_path = self.snapshot_path();
        let _guard = self.file.lock().await;

        let copied_len = tokio::fs::copy(&self.path, &snapshot_path)
            .await
            .map_err(|e| LedgerError::io("snapshot", &self.path, e))?;

        debug!(
            "Copied ledger {} to {} ({} bytes)",
            self.path.display(),
            snapshot_path.display(),
            copied_len
        );
        Ok(LedgerSnapshot {
            path: snapshot_path,
            copied_len,
        })
    }

    /// Empty the ledger in place
    pub async fn truncate(&self) -> LedgerResult<()> {
        let file = self.file.lock().await;
        self.clear(&file).await
    }

    async fn clear(&self, file: &File) -> LedgerResult<()> {
        file.set_len(0)
            .await
            .map_err(|e| LedgerError::io("truncate", &self.path, e))?;
        info!("Cleared failed-download ledger: {}", self.path.display());
        Ok(())
    }

    /// Replace the snapshotted part of the ledger with `lines`
    ///
    /// Whatever was appended after `snapshot` was taken is kept and written
    /// after `lines`. The read, truncate and write happen under one lock.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Io` if the ledger cannot be read, truncated or
    /// written. On a write failure the appended lines that were dropped are
    /// logged at error level.
    pub async fn replace_snapshotted<I, B>(
        &self,
        snapshot: &LedgerSnapshot,
        lines: I,
    ) -> LedgerResult<()>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut buffer = join_lines(lines);
        let mut file = self.file.lock().await;

        let current = tokio::fs::read(&self.path)
            .await
            .map_err(|e| LedgerError::io("read", &self.path, e))?;
        let appended = usize::try_from(snapshot.copied_len)
            .ok()
            .and_then(|start| current.get(start..))
            .unwrap_or(&[]);
        if !appended.is_empty() {
            debug!(
                "Keeping {} bytes appended to {} during reconciliation",
                appended.len(),
                self.path.display()
            );
        }
        buffer.extend_from_slice(appended);

        self.clear(&file).await?;

        if buffer.is_empty() {
            return Ok(());
        }

        if let Err(e) = write_flushed(&mut file, &buffer).await {
            for (_, line) in non_empty_lines(appended) {
                error!(
                    "Unrecorded ledger line: {}",
                    String::from_utf8_lossy(line)
                );
            }
            return Err(LedgerError::io("rewrite", &self.path, e));
        }
        Ok(())
    }

    /// Whether the ledger holds at least one non-empty line
    pub async fn has_pending_entries(&self) -> LedgerResult<bool> {
        let _guard = self.file.lock().await;
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(LedgerError::io("read", &self.path, e)),
        };
        let has_any = non_empty_lines(&bytes).next().is_some();
        Ok(has_any)
    }

    /// Read and parse the live ledger without modifying it
    pub async fn read(&self) -> LedgerResult<LedgerContents> {
        let _guard = self.file.lock().await;
        read_ledger_file(&self.path).await
    }
}

/// Read a ledger-format file line by line
///
/// Line terminators are trimmed and empty lines discarded. Lines that do not
/// decode or parse are returned separately instead of failing the whole read.
pub async fn read_ledger_file(path: &Path) -> LedgerResult<LedgerContents> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LedgerError::io("read", path, e))?;
    Ok(parse_ledger_bytes(&bytes))
}

fn parse_ledger_bytes(bytes: &[u8]) -> LedgerContents {
    let mut contents = LedgerContents::default();

    for (line_no, raw) in non_empty_lines(bytes) {
        let malformed = |reason: String| MalformedLine {
            line_no,
            content: String::from_utf8_lossy(raw).into_owned(),
            raw: raw.to_vec(),
            reason,
        };

        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                contents
                    .malformed
                    .push(malformed(format!("invalid UTF-8: {}", e)));
                continue;
            }
        };

        match LedgerEntry::parse_line(line, line_no) {
            Ok(entry) => contents.entries.push(entry),
            Err(LedgerError::MalformedLine { reason, .. }) => {
                contents.malformed.push(malformed(reason))
            }
            Err(other) => contents.malformed.push(malformed(other.to_string())),
        }
    }

    contents
}

/// Non-empty lines with their 1-based line numbers, `\r` trimmed
fn non_empty_lines(bytes: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    bytes
        .split(|&b| b == b'\n')
        .enumerate()
        .map(|(index, line)| (index + 1, trim_cr(line)))
        .filter(|(_, line)| !line.is_empty())
}

fn trim_cr(mut line: &[u8]) -> &[u8] {
    while let [b'\r', rest @ ..] = line {
        line = rest;
    }
    while let [rest @ .., b'\r'] = line {
        line = rest;
    }
    line
}

fn join_lines<I, B>(lines: I) -> Vec<u8>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut buffer = Vec::new();
    for line in lines {
        buffer.extend_from_slice(line.as_ref());
        buffer.push(b'\n');
    }
    buffer
}

async fn write_flushed(file: &mut File, buffer: &[u8]) -> std::io::Result<()> {
    file.write_all(buffer).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn entry(name: &str) -> LedgerEntry {
        LedgerEntry::with_timestamp(
            "2024-01-01 00:00:00",
            format!("/out/{}", name),
            &format!("http://x/{}", name),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("failed-download.txt");

        let ledger = FailureLedger::open(&path).await.unwrap();
        assert!(path.exists());
        assert!(!ledger.has_pending_entries().await.unwrap());
    }

    #[tokio::test]
    async fn test_append_writes_pipe_delimited_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        let ledger = FailureLedger::open(&path).await.unwrap();

        ledger.append(&entry("a.mp3")).await.unwrap();
        ledger.append(&entry("b.mp3")).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            content,
            "2024-01-01 00:00:00|/out/a.mp3|http://x/a.mp3\n2024-01-01 00:00:00|/out/b.mp3|http://x/b.mp3\n"
        );
        assert!(ledger.has_pending_entries().await.unwrap());
    }

    #[tokio::test]
    async fn test_reopen_appends_to_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        {
            let ledger = FailureLedger::open(&path).await.unwrap();
            ledger.append(&entry("a.mp3")).await.unwrap();
        }

        let ledger = FailureLedger::open(&path).await.unwrap();
        ledger.append(&entry("b.mp3")).await.unwrap();

        let contents = ledger.read().await.unwrap();
        assert_eq!(contents.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        let ledger = Arc::new(FailureLedger::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..50 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.append(&entry(&format!("{}.mp3", i))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let contents = ledger.read().await.unwrap();
        assert_eq!(contents.entries.len(), 50);
        assert!(contents.malformed.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_and_truncate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        let ledger = FailureLedger::open(&path).await.unwrap();
        ledger.append(&entry("a.mp3")).await.unwrap();

        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(
            snapshot.path(),
            temp_dir.path().join("failed-download.txt.tmp")
        );
        assert_eq!(snapshot.copied_len(), 46);

        ledger.truncate().await.unwrap();
        assert!(!ledger.has_pending_entries().await.unwrap());
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), 0);

        // Snapshot is unaffected by truncation
        let contents = read_ledger_file(snapshot.path()).await.unwrap();
        assert_eq!(contents.entries, vec![entry("a.mp3")]);

        // Appends after truncation start from the beginning of the file
        ledger.append(&entry("b.mp3")).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "2024-01-01 00:00:00|/out/b.mp3|http://x/b.mp3\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_snapshot_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        let ledger = FailureLedger::open(&path).await.unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let snapshot = ledger.snapshot().await.unwrap();
        let mode = std::fs::metadata(snapshot.path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[tokio::test]
    async fn test_read_skips_blank_and_reports_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        tokio::fs::write(
            &path,
            "\r\n2024-01-01 00:00:00|/out/a.mp3|http://x/a.mp3\r\n\nbroken line\n",
        )
        .await
        .unwrap();

        let ledger = FailureLedger::open(&path).await.unwrap();
        assert!(ledger.has_pending_entries().await.unwrap());

        let contents = ledger.read().await.unwrap();
        assert_eq!(contents.entries, vec![entry("a.mp3")]);
        assert_eq!(contents.malformed.len(), 1);
        assert_eq!(contents.malformed[0].line_no, 4);
        assert_eq!(contents.malformed[0].content, "broken line");
    }

    #[tokio::test]
    async fn test_blank_lines_are_not_pending() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        tokio::fs::write(&path, "\n\r\n\n").await.unwrap();

        let ledger = FailureLedger::open(&path).await.unwrap();
        assert!(!ledger.has_pending_entries().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_malformed_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        let mut content = b"2024-01-01 00:00:00|/out/a.mp3|http://x/a.mp3\n".to_vec();
        let cut_line = b"2024-01-01 00:00:00|/out/\xe9\x9f|http://x/b.mp3".to_vec();
        content.extend_from_slice(&cut_line);
        content.push(b'\n');
        tokio::fs::write(&path, &content).await.unwrap();

        let ledger = FailureLedger::open(&path).await.unwrap();
        assert!(ledger.has_pending_entries().await.unwrap());

        let contents = ledger.read().await.unwrap();
        assert_eq!(contents.entries, vec![entry("a.mp3")]);
        assert_eq!(contents.malformed.len(), 1);
        assert_eq!(contents.malformed[0].line_no, 2);
        assert_eq!(contents.malformed[0].raw, cut_line);
        assert!(contents.malformed[0].reason.contains("UTF-8"));
    }

    #[tokio::test]
    async fn test_replace_snapshotted_keeps_later_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        let ledger = FailureLedger::open(&path).await.unwrap();
        ledger.append(&entry("a.mp3")).await.unwrap();
        ledger.append(&entry("b.mp3")).await.unwrap();

        let snapshot = ledger.snapshot().await.unwrap();
        ledger.append(&entry("c.mp3")).await.unwrap();

        ledger
            .replace_snapshotted(&snapshot, [entry("b.mp3").to_line()])
            .await
            .unwrap();

        let contents = ledger.read().await.unwrap();
        assert_eq!(contents.entries, vec![entry("b.mp3"), entry("c.mp3")]);
    }

    #[tokio::test]
    async fn test_replace_snapshotted_with_nothing_left_empties_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("failed-download.txt");
        let ledger = FailureLedger::open(&path).await.unwrap();
        ledger.append(&entry("a.mp3")).await.unwrap();

        let snapshot = ledger.snapshot().await.unwrap();
        ledger
            .replace_snapshotted(&snapshot, Vec::<String>::new())
            .await
            .unwrap();

        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), 0);
        assert!(!ledger.has_pending_entries().await.unwrap());
    }
}
