//! Artifact store: path-safe, atomic filesystem operations.
//!
//! Two invariants hold for every operation here:
//!
//! - No partially written file is ever observable at its target name.
//!   Writes go to an unpredictable `.tmp-*` sibling and are renamed into
//!   place (POSIX-atomic within a directory).
//! - No write escapes the data directory. Targets are addressed by
//!   [`SafeRelPath`], which cannot express traversal.
//!
//! With `fsync` enabled, the file and its parent directory are synced after
//! every rename so a completed write survives power loss.

mod safe_path;

use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

pub use safe_path::{safe_join, PathSafetyError, SafeRelPath};

/// Prefix of in-flight temporary files.
pub const TMP_PREFIX: &str = ".tmp-";

/// Errors from artifact store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// An I/O operation failed.
    #[error("{op}: {source}")]
    Io {
        /// What the store was doing.
        op: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// A listed file has a non-UTF-8 name.
    #[error("non-UTF-8 file name under {}", root.display())]
    NonUtf8Name {
        /// Directory being listed.
        root: PathBuf,
    },
}

impl StoreError {
    fn io(op: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            op: op.into(),
            source,
        }
    }
}

/// Result of a successful artifact write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifact {
    /// Relative path of the artifact.
    pub path: SafeRelPath,
    /// Size in bytes.
    pub size: u64,
}

/// Filesystem layer owning the data directory layout.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    data_dir: PathBuf,
    fsync: bool,
}

impl ArtifactStore {
    /// Creates a store rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, fsync: bool) -> Self {
        Self {
            data_dir: data_dir.into(),
            fsync,
        }
    }

    /// The store's root directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory of a run, `{dataDir}/runs/{runId}`.
    #[must_use]
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.data_dir.join("runs").join(run_id)
    }

    /// Recursively creates a directory if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on filesystem failure.
    pub fn ensure_dir(&self, path: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(path)
            .map_err(|e| StoreError::io(format!("creating directory {}", path.display()), e))
    }

    /// Atomically writes one artifact under `base`.
    ///
    /// The bytes land in a `.tmp-*` sibling first and are renamed into
    /// place; on error the temp file is unlinked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on filesystem failure.
    pub fn write_artifact(
        &self,
        base: &Path,
        path: &SafeRelPath,
        bytes: &[u8],
    ) -> Result<WrittenArtifact, StoreError> {
        let staged = self.stage(base, path, bytes)?;
        self.commit(staged, base, path)?;
        Ok(WrittenArtifact {
            path: path.clone(),
            size: bytes.len() as u64,
        })
    }

    /// Atomically writes a batch of artifacts under `base`.
    ///
    /// Phase 1 stages every entry to a temp file; phase 2 renames them all.
    /// If any phase-1 write fails, every temp file already created is
    /// unlinked and nothing is observable. The rename phase is atomic per
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on filesystem failure.
    pub fn write_artifacts_batch(
        &self,
        base: &Path,
        entries: &[(SafeRelPath, Vec<u8>)],
    ) -> Result<Vec<WrittenArtifact>, StoreError> {
        // Phase 1: stage everything. NamedTempFile unlinks on drop, so an
        // early return cleans up every staged file.
        let mut staged = Vec::with_capacity(entries.len());
        for (path, bytes) in entries {
            staged.push(self.stage(base, path, bytes)?);
        }

        // Phase 2: rename into place.
        let mut written = Vec::with_capacity(entries.len());
        for (tmp, (path, bytes)) in staged.into_iter().zip(entries) {
            self.commit(tmp, base, path)?;
            written.push(WrittenArtifact {
                path: path.clone(),
                size: bytes.len() as u64,
            });
        }
        Ok(written)
    }

    /// Lists all files under `root` as sorted `/`-separated relative paths.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on filesystem failure or non-UTF-8 names.
    pub fn list_files_recursive(&self, root: &Path) -> Result<Vec<String>, StoreError> {
        let mut files = Vec::new();
        collect_files(root, root, &mut files)?;
        files.sort();
        Ok(files)
    }

    /// Size of a file in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be stat'd.
    pub fn size_of(&self, path: &Path) -> Result<u64, StoreError> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| StoreError::io(format!("stat {}", path.display()), e))
    }

    /// Removes orphaned `.tmp-*` files older than `max_age` under
    /// `{dataDir}/runs/*`.
    ///
    /// Startup hygiene for temp files left by crashed writers. Returns the
    /// number of files removed. Uses filesystem mtimes, which never feed
    /// hashed state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on filesystem failure other than files
    /// vanishing mid-sweep.
    pub fn reap_orphan_temps(&self, max_age: Duration) -> Result<usize, StoreError> {
        let runs = self.data_dir.join("runs");
        if !runs.is_dir() {
            return Ok(0);
        }
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut reaped = 0;
        reap_dir(&runs, cutoff, &mut reaped)?;
        if reaped > 0 {
            debug!(reaped, "removed orphan temp files");
        }
        Ok(reaped)
    }

    /// Stages bytes to an unpredictable temp file in the target's directory.
    fn stage(
        &self,
        base: &Path,
        path: &SafeRelPath,
        bytes: &[u8],
    ) -> Result<NamedTempFile, StoreError> {
        let target = path.join_under(base);
        let parent = target.parent().unwrap_or(base);
        self.ensure_dir(parent)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TMP_PREFIX)
            .tempfile_in(parent)
            .map_err(|e| StoreError::io(format!("creating temp file for {path}"), e))?;
        tmp.write_all(bytes)
            .map_err(|e| StoreError::io(format!("writing temp file for {path}"), e))?;
        if self.fsync {
            tmp.as_file()
                .sync_all()
                .map_err(|e| StoreError::io(format!("syncing temp file for {path}"), e))?;
        }
        Ok(tmp)
    }

    /// Renames a staged temp file onto its target.
    fn commit(&self, tmp: NamedTempFile, base: &Path, path: &SafeRelPath) -> Result<(), StoreError> {
        let target = path.join_under(base);
        tmp.persist(&target)
            .map_err(|e| StoreError::io(format!("renaming into place: {path}"), e.error))?;
        if self.fsync {
            let parent = target.parent().unwrap_or(base);
            sync_dir(parent)?;
        }
        Ok(())
    }
}

/// Fsyncs a directory so a completed rename survives power loss.
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    let handle = File::open(dir)
        .map_err(|e| StoreError::io(format!("opening directory {}", dir.display()), e))?;
    handle
        .sync_all()
        .map_err(|e| StoreError::io(format!("syncing directory {}", dir.display()), e))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| StoreError::io(format!("reading directory {}", dir.display()), e))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| StoreError::io(format!("reading directory {}", dir.display()), e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| StoreError::NonUtf8Name {
                    root: root.to_path_buf(),
                })?
                .join("/");
            out.push(rel);
        }
    }
    Ok(())
}

fn reap_dir(dir: &Path, cutoff: SystemTime, reaped: &mut usize) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| StoreError::io(format!("reading directory {}", dir.display()), e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            reap_dir(&path, cutoff, reaped)?;
            continue;
        }
        let is_tmp = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(TMP_PREFIX));
        if !is_tmp {
            continue;
        }
        let old_enough = entry
            .metadata()
            .and_then(|m| m.modified())
            .is_ok_and(|mtime| mtime < cutoff);
        if old_enough {
            // A concurrent writer may have just committed it; vanishing is
            // not an error.
            if fs::remove_file(&path).is_ok() {
                *reaped += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> ArtifactStore {
        ArtifactStore::new(dir, false)
    }

    #[test]
    fn test_write_artifact_lands_at_target() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let rel = SafeRelPath::new("artifacts/report.json").unwrap();

        let written = store.write_artifact(tmp.path(), &rel, b"{}").unwrap();
        assert_eq!(written.size, 2);
        assert_eq!(
            fs::read(tmp.path().join("artifacts/report.json")).unwrap(),
            b"{}"
        );
    }

    #[test]
    fn test_no_temp_files_remain_after_write() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let rel = SafeRelPath::new("artifacts/a.txt").unwrap();
        store.write_artifact(tmp.path(), &rel, b"x").unwrap();

        let listed = store.list_files_recursive(tmp.path()).unwrap();
        assert_eq!(listed, vec!["artifacts/a.txt"]);
    }

    #[test]
    fn test_batch_writes_all_or_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let entries = vec![
            (SafeRelPath::new("artifacts/b.txt").unwrap(), b"b".to_vec()),
            (SafeRelPath::new("artifacts/a.txt").unwrap(), b"a".to_vec()),
        ];
        let written = store.write_artifacts_batch(tmp.path(), &entries).unwrap();
        assert_eq!(written.len(), 2);
        assert!(tmp.path().join("artifacts/a.txt").exists());
        assert!(tmp.path().join("artifacts/b.txt").exists());
    }

    #[test]
    fn test_list_files_recursive_is_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        for name in ["z.txt", "a.txt", "m/inner.txt"] {
            let rel = SafeRelPath::new(name).unwrap();
            store.write_artifact(tmp.path(), &rel, b"x").unwrap();
        }
        let listed = store.list_files_recursive(tmp.path()).unwrap();
        assert_eq!(listed, vec!["a.txt", "m/inner.txt", "z.txt"]);
    }

    #[test]
    fn test_size_of() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let rel = SafeRelPath::new("f.bin").unwrap();
        store.write_artifact(tmp.path(), &rel, &[0u8; 123]).unwrap();
        assert_eq!(store.size_of(&tmp.path().join("f.bin")).unwrap(), 123);
    }

    #[test]
    fn test_reaper_removes_only_old_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let run_dir = tmp.path().join("runs/abc/artifacts");
        fs::create_dir_all(&run_dir).unwrap();
        fs::write(run_dir.join(".tmp-orphan"), b"junk").unwrap();
        fs::write(run_dir.join("kept.txt"), b"keep").unwrap();

        // max_age of zero means everything qualifies.
        let reaped = store.reap_orphan_temps(Duration::ZERO).unwrap();
        assert_eq!(reaped, 1);
        assert!(!run_dir.join(".tmp-orphan").exists());
        assert!(run_dir.join("kept.txt").exists());

        // Fresh temp files survive a sweep with a large threshold.
        fs::write(run_dir.join(".tmp-fresh"), b"junk").unwrap();
        let reaped = store.reap_orphan_temps(Duration::from_secs(3600)).unwrap();
        assert_eq!(reaped, 0);
        assert!(run_dir.join(".tmp-fresh").exists());
    }

    #[test]
    fn test_run_dir_layout() {
        let store = ArtifactStore::new("/data", false);
        assert_eq!(
            store.run_dir(&"a".repeat(64)),
            PathBuf::from("/data/runs").join("a".repeat(64))
        );
    }

    #[test]
    fn test_fsync_mode_writes_identically() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path(), true);
        let rel = SafeRelPath::new("artifacts/d.txt").unwrap();
        store.write_artifact(tmp.path(), &rel, b"durable").unwrap();
        assert_eq!(
            fs::read(tmp.path().join("artifacts/d.txt")).unwrap(),
            b"durable"
        );
    }
}
