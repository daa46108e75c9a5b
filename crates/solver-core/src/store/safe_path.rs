//! Path-safety value type for artifact paths.
//!
//! Every relative path that reaches the filesystem layer is a
//! [`SafeRelPath`], constructed through a single validating constructor.
//! Downstream code cannot fabricate an unsafe path; the evidence validator
//! applies the same predicate to manifests it did not produce.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Why a relative path failed the safety predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PathSafetyError {
    /// The path is empty.
    #[error("path is empty")]
    Empty,

    /// The path is absolute.
    #[error("path '{path}' is absolute")]
    Absolute {
        /// The offending path.
        path: String,
    },

    /// The path contains a NUL byte.
    #[error("path contains a NUL byte")]
    NulByte,

    /// A segment is empty, `.`, `..`, or contains a backslash.
    #[error("path '{path}' contains unsafe segment '{segment}'")]
    UnsafeSegment {
        /// The offending path.
        path: String,
        /// The segment that failed.
        segment: String,
    },
}

/// A validated relative path that cannot escape its base directory.
///
/// Valid iff non-empty, not absolute, free of NUL bytes, and composed of
/// `/`-separated segments none of which is empty, `.`, `..`, or contains a
/// backslash. Such a path normalizes to a strict descendant of any base it
/// is joined under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SafeRelPath(String);

impl SafeRelPath {
    /// Validates and wraps a relative path.
    ///
    /// # Errors
    ///
    /// Returns [`PathSafetyError`] describing the first failed predicate.
    pub fn new(path: &str) -> Result<Self, PathSafetyError> {
        if path.is_empty() {
            return Err(PathSafetyError::Empty);
        }
        if path.contains('\0') {
            return Err(PathSafetyError::NulByte);
        }
        if path.starts_with('/') {
            return Err(PathSafetyError::Absolute {
                path: path.to_string(),
            });
        }
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return Err(PathSafetyError::UnsafeSegment {
                    path: path.to_string(),
                    segment: segment.to_string(),
                });
            }
        }
        Ok(Self(path.to_string()))
    }

    /// The path as a `/`-separated string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final segment of the path.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Joins the path under a base directory.
    #[must_use]
    pub fn join_under(&self, base: &Path) -> PathBuf {
        let mut joined = base.to_path_buf();
        for segment in self.0.split('/') {
            joined.push(segment);
        }
        joined
    }
}

impl fmt::Display for SafeRelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SafeRelPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Joins a candidate relative path under a base, or refuses.
///
/// Returns `None` (the not-allowed sentinel) when the candidate fails the
/// safety predicate; never touches the filesystem.
#[must_use]
pub fn safe_join(base: &Path, candidate: &str) -> Option<PathBuf> {
    SafeRelPath::new(candidate)
        .ok()
        .map(|rel| rel.join_under(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_artifact_paths() {
        for p in ["artifacts/report.json", "artifacts/sub/dir/file.txt", "a"] {
            assert!(SafeRelPath::new(p).is_ok(), "should accept {p}");
        }
    }

    #[test]
    fn test_rejects_traversal_and_absolutes() {
        for p in [
            "",
            "/etc/passwd",
            "../../etc/passwd",
            "artifacts/../escape",
            "artifacts/./x",
            "artifacts//x",
            "artifacts/",
            "artifacts\\x",
            "artifacts/a\0b",
        ] {
            assert!(SafeRelPath::new(p).is_err(), "should reject {p:?}");
        }
    }

    #[test]
    fn test_safe_join_descends_or_refuses() {
        let base = Path::new("/data/runs/abc");
        let joined = safe_join(base, "artifacts/report.json").unwrap();
        assert!(joined.starts_with(base));
        assert_eq!(joined, base.join("artifacts").join("report.json"));

        assert!(safe_join(base, "../../etc/passwd").is_none());
        assert!(safe_join(base, "/etc/passwd").is_none());
    }

    #[test]
    fn test_deserialize_enforces_predicate() {
        let ok: Result<SafeRelPath, _> = serde_json::from_str(r#""artifacts/report.json""#);
        assert!(ok.is_ok());
        let bad: Result<SafeRelPath, _> = serde_json::from_str(r#""../../etc/passwd""#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_file_name() {
        let p = SafeRelPath::new("artifacts/report.json").unwrap();
        assert_eq!(p.file_name(), "report.json");
    }
}
