//! Append-only JSONL logs with cross-process locking.
//!
//! One JSON object per line, no embedded newlines, UTF-8. Appends are
//! at-least-once durable under concurrent writers within and across
//! processes: writers serialize on an advisory exclusive lock and replace
//! the file via temp-write + rename, so a reader (or a crash) never
//! observes a partial line.
//!
//! The lock subject is the log's parent directory, not the log file. A
//! rename-over-the-target would break a lock held on the target's inode:
//! a second writer could be blocked on the old inode while a third opens
//! the new one, and the lock would no longer serialize them. The directory
//! handle is never replaced, so the lock stays meaningful for every
//! writer.
//!
//! Readers must tolerate duplicate records: a crash between an append and
//! its acknowledgement is re-run idempotently, keyed by `receiptId`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt as _;
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

/// Default number of lock acquisition attempts.
const DEFAULT_LOCK_ATTEMPTS: u32 = 50;

/// Default sleep between lock attempts.
const DEFAULT_LOCK_BACKOFF: Duration = Duration::from_millis(20);

/// Errors from append-log operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppendLogError {
    /// The record could not be serialized to JSON.
    #[error("serializing record: {source}")]
    Serialize {
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The serialized record contains a newline.
    #[error("record serializes with an embedded newline")]
    EmbeddedNewline,

    /// The lock could not be acquired within the retry budget.
    #[error("lock timeout after {attempts} attempts on {}", path.display())]
    LockTimeout {
        /// Attempts made.
        attempts: u32,
        /// The log path.
        path: PathBuf,
    },

    /// An I/O operation failed.
    #[error("{op}: {source}")]
    Io {
        /// What the log was doing.
        op: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

impl AppendLogError {
    fn io(op: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            op: op.into(),
            source,
        }
    }
}

/// An append-only JSONL file shared by OS file lock.
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
    fsync: bool,
    lock_attempts: u32,
    lock_backoff: Duration,
}

impl AppendLog {
    /// Creates a log at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, fsync: bool) -> Self {
        Self {
            path: path.into(),
            fsync,
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
            lock_backoff: DEFAULT_LOCK_BACKOFF,
        }
    }

    /// Overrides the lock retry budget.
    #[must_use]
    pub const fn with_lock_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.lock_attempts = attempts;
        self.lock_backoff = backoff;
        self
    }

    /// The log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a single JSON line, durably and atomically.
    ///
    /// Serializes the record, acquires the cross-process lock with bounded
    /// retry, rewrites the file through a temp sibling, and renames it into
    /// place. A crash at any point leaves either the old file or the new
    /// one, never a torn line.
    ///
    /// # Errors
    ///
    /// Returns [`AppendLogError::LockTimeout`] when the retry budget is
    /// exhausted, or [`AppendLogError::Io`] on filesystem failure.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<(), AppendLogError> {
        let line = self.encode_line(record)?;
        let parent = self.ensure_parent()?;

        let _lock = DirLock::acquire(&parent, &self.path, self.lock_attempts, self.lock_backoff)?;

        if self.path.exists() {
            let mut existing = Vec::new();
            File::open(&self.path)
                .and_then(|mut f| f.read_to_end(&mut existing))
                .map_err(|e| AppendLogError::io("reading existing log", e))?;
            existing.extend_from_slice(line.as_bytes());

            let mut tmp = tempfile::Builder::new()
                .prefix(".tmp-")
                .tempfile_in(&parent)
                .map_err(|e| AppendLogError::io("creating log temp file", e))?;
            tmp.write_all(&existing)
                .map_err(|e| AppendLogError::io("writing log temp file", e))?;
            if self.fsync {
                tmp.as_file()
                    .sync_all()
                    .map_err(|e| AppendLogError::io("syncing log temp file", e))?;
            }
            tmp.persist(&self.path)
                .map_err(|e| AppendLogError::io("renaming log into place", e.error))?;
        } else {
            let mut file = OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&self.path)
                .map_err(|e| AppendLogError::io("creating log", e))?;
            file.write_all(line.as_bytes())
                .map_err(|e| AppendLogError::io("writing log", e))?;
            if self.fsync {
                file.sync_all()
                    .map_err(|e| AppendLogError::io("syncing log", e))?;
            }
        }

        if self.fsync {
            sync_dir(&parent)?;
        }
        trace!(path = %self.path.display(), "appended record");
        Ok(())
    }

    /// Appends without locking or rewriting.
    ///
    /// O(1), but unsafe for concurrent writers: two processes appending
    /// through this path can interleave partial lines. Only for contexts
    /// where the log is provably single-writer.
    ///
    /// # Errors
    ///
    /// Returns [`AppendLogError::Io`] on filesystem failure.
    pub fn append_fast<T: Serialize>(&self, record: &T) -> Result<(), AppendLogError> {
        let line = self.encode_line(record)?;
        self.ensure_parent()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppendLogError::io("opening log for append", e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| AppendLogError::io("appending to log", e))?;
        Ok(())
    }

    /// Reads every line of the log. Missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`AppendLogError::Io`] on filesystem failure.
    pub fn read_lines(&self) -> Result<Vec<String>, AppendLogError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AppendLogError::io("reading log", e)),
        }
    }

    /// Returns true if some record has `field` equal to `value`.
    ///
    /// Lines that do not parse are skipped; torn lines cannot occur through
    /// [`Self::append`], but a reader must not fail on logs written by the
    /// fast path.
    ///
    /// # Errors
    ///
    /// Returns [`AppendLogError::Io`] on filesystem failure.
    pub fn contains_field(&self, field: &str, value: &str) -> Result<bool, AppendLogError> {
        for line in self.read_lines()? {
            if let Ok(record) = serde_json::from_str::<serde_json::Value>(&line) {
                if record.get(field).and_then(serde_json::Value::as_str) == Some(value) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn encode_line<T: Serialize>(&self, record: &T) -> Result<String, AppendLogError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| AppendLogError::Serialize { source: e })?;
        if line.contains('\n') {
            return Err(AppendLogError::EmbeddedNewline);
        }
        line.push('\n');
        Ok(line)
    }

    fn ensure_parent(&self) -> Result<PathBuf, AppendLogError> {
        let parent = self
            .path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        std::fs::create_dir_all(&parent)
            .map_err(|e| AppendLogError::io("creating log directory", e))?;
        Ok(parent)
    }
}

/// Held advisory lock on the log's parent directory.
///
/// Dropping the handle releases the lock.
struct DirLock {
    #[allow(dead_code)]
    handle: Option<File>,
}

impl DirLock {
    fn acquire(
        dir: &Path,
        log_path: &Path,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Self, AppendLogError> {
        #[cfg(unix)]
        {
            let handle = File::open(dir)
                .map_err(|e| AppendLogError::io("opening log directory for locking", e))?;
            for attempt in 0..attempts {
                match handle.try_lock_exclusive() {
                    Ok(()) => return Ok(Self {
                        handle: Some(handle),
                    }),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        if attempt + 1 < attempts {
                            std::thread::sleep(backoff);
                        }
                    },
                    Err(e) => return Err(AppendLogError::io("locking log directory", e)),
                }
            }
            Err(AppendLogError::LockTimeout {
                attempts,
                path: log_path.to_path_buf(),
            })
        }
        #[cfg(not(unix))]
        {
            // Directory handles cannot be locked portably; assume a single
            // writer per host on non-Unix platforms.
            let _ = (dir, log_path, attempts, backoff);
            Ok(Self { handle: None })
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(handle) = &self.handle {
            let _ = fs2::FileExt::unlock(handle);
        }
    }
}

/// Fsyncs a directory so a completed rename survives power loss.
fn sync_dir(dir: &Path) -> Result<(), AppendLogError> {
    let handle =
        File::open(dir).map_err(|e| AppendLogError::io("opening log directory for sync", e))?;
    handle
        .sync_all()
        .map_err(|e| AppendLogError::io("syncing log directory", e))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Record {
        id: String,
        n: u64,
    }

    #[test]
    fn test_append_creates_file_with_one_line() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AppendLog::new(tmp.path().join("refusals.jsonl"), false);
        log.append(&Record {
            id: "a".to_string(),
            n: 1,
        })
        .unwrap();

        let lines = log.read_lines().unwrap();
        assert_eq!(lines.len(), 1);
        let back: Record = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(back.n, 1);
    }

    #[test]
    fn test_sequential_appends_accumulate() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AppendLog::new(tmp.path().join("log.jsonl"), false);
        for n in 0..10 {
            log.append(&Record {
                id: format!("r{n}"),
                n,
            })
            .unwrap();
        }
        assert_eq!(log.read_lines().unwrap().len(), 10);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AppendLog::new(tmp.path().join("absent.jsonl"), false);
        assert!(log.read_lines().unwrap().is_empty());
        assert!(!log.contains_field("id", "x").unwrap());
    }

    #[test]
    fn test_contains_field() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AppendLog::new(tmp.path().join("log.jsonl"), false);
        log.append(&Record {
            id: "wanted".to_string(),
            n: 7,
        })
        .unwrap();
        assert!(log.contains_field("id", "wanted").unwrap());
        assert!(!log.contains_field("id", "other").unwrap());
    }

    #[test]
    fn test_concurrent_appends_yield_exactly_n_whole_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("concurrent.jsonl");
        let writers = 8;
        let per_writer = 25;

        let path = Arc::new(path);
        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let path = Arc::clone(&path);
                std::thread::spawn(move || {
                    let log = AppendLog::new(path.as_ref().clone(), false)
                        .with_lock_retry(500, Duration::from_millis(2));
                    for n in 0..per_writer {
                        log.append(&Record {
                            id: format!("w{w}-{n}"),
                            n,
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let log = AppendLog::new(path.as_ref().clone(), false);
        let lines = log.read_lines().unwrap();
        assert_eq!(lines.len(), writers as usize * per_writer as usize);
        for line in &lines {
            let record: Record = serde_json::from_str(line).unwrap();
            assert!(record.n < per_writer);
        }
    }

    #[test]
    fn test_lock_timeout_surfaces() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("locked.jsonl");

        // Hold the directory lock from this thread.
        let dir_handle = File::open(tmp.path()).unwrap();
        dir_handle.try_lock_exclusive().unwrap();

        let log = AppendLog::new(&path, false).with_lock_retry(3, Duration::from_millis(1));
        let err = log
            .append(&Record {
                id: "x".to_string(),
                n: 0,
            })
            .unwrap_err();
        assert!(matches!(err, AppendLogError::LockTimeout { attempts: 3, .. }));

        fs2::FileExt::unlock(&dir_handle).unwrap();
    }

    #[test]
    fn test_append_fast_single_writer() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AppendLog::new(tmp.path().join("fast.jsonl"), false);
        for n in 0..5 {
            log.append_fast(&Record {
                id: format!("f{n}"),
                n,
            })
            .unwrap();
        }
        assert_eq!(log.read_lines().unwrap().len(), 5);
    }
}
