//! Independent evidence bundle verifier.
//!
//! Given a run directory, decides whether the bundle is internally
//! consistent and unmodified. The validator shares the path-safety
//! predicate and the streaming hasher with the producer side but trusts
//! nothing else: it re-derives sizes and hashes from the filesystem.
//!
//! Error messages never contain host paths; only manifest-relative paths
//! appear.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::manifest::MANIFEST_VERSION;
use super::sha256_file;
use crate::store::{safe_join, SafeRelPath};

/// Stable error codes emitted by the validator, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityErrorCode {
    /// `evidence/manifest.json` is missing.
    ManifestNotFound,
    /// The manifest is not well-formed JSON.
    ManifestParseError,
    /// The manifest does not match the schema.
    SchemaValidationError,
    /// An artifact path fails the safety predicate.
    UnsafePath,
    /// Joining an artifact path under the run directory was refused.
    PathEscape,
    /// A file referenced by the manifest is absent.
    ArtifactNotFound,
    /// Filesystem size differs from the recorded `bytes`.
    SizeMismatch,
    /// Recomputed SHA-256 differs from the recorded `sha256`.
    HashMismatch,
}

impl IntegrityErrorCode {
    /// Wire name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ManifestNotFound => "MANIFEST_NOT_FOUND",
            Self::ManifestParseError => "MANIFEST_PARSE_ERROR",
            Self::SchemaValidationError => "SCHEMA_VALIDATION_ERROR",
            Self::UnsafePath => "UNSAFE_PATH",
            Self::PathEscape => "PATH_ESCAPE",
            Self::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            Self::SizeMismatch => "SIZE_MISMATCH",
            Self::HashMismatch => "HASH_MISMATCH",
        }
    }
}

impl std::fmt::Display for IntegrityErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding of the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityError {
    /// Stable error code.
    pub code: IntegrityErrorCode,
    /// Human-readable description (manifest-relative paths only).
    pub message: String,
    /// The artifact path the finding refers to, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Result of validating one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceReport {
    /// True iff no errors were found.
    pub valid: bool,
    /// Ordered findings.
    pub errors: Vec<IntegrityError>,
}

/// Untyped manifest mirror used during validation.
///
/// Artifact paths stay raw strings here so an unsafe path surfaces as
/// [`IntegrityErrorCode::UnsafePath`] rather than a deserialization error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawManifest {
    manifest_version: String,
    #[allow(dead_code)]
    intent_id: String,
    #[allow(dead_code)]
    run_id: String,
    #[allow(dead_code)]
    job_type: String,
    #[allow(dead_code)]
    created_at: String,
    artifacts: Vec<RawArtifact>,
    #[allow(dead_code)]
    policy_decision: RawPolicyDecision,
    #[allow(dead_code)]
    execution_summary: RawExecutionSummary,
    #[allow(dead_code)]
    solver: RawSolver,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawArtifact {
    path: String,
    sha256: String,
    bytes: u64,
    #[allow(dead_code)]
    content_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPolicyDecision {
    #[allow(dead_code)]
    allowed: bool,
    #[allow(dead_code)]
    reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawExecutionSummary {
    status: String,
    #[allow(dead_code)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSolver {
    #[allow(dead_code)]
    service: String,
    #[allow(dead_code)]
    service_version: String,
    #[allow(dead_code)]
    git_commit: Option<String>,
}

/// Validates the evidence bundle under `run_dir`.
///
/// Findings are ordered: manifest-level checks first, then per-artifact
/// checks in manifest order. Artifact hashing streams, so bundles larger
/// than memory verify in constant space.
#[must_use]
pub fn validate_evidence(run_dir: &Path) -> EvidenceReport {
    let mut errors = Vec::new();

    let manifest_path = run_dir.join("evidence").join("manifest.json");
    if !manifest_path.is_file() {
        errors.push(IntegrityError {
            code: IntegrityErrorCode::ManifestNotFound,
            message: "evidence/manifest.json not found".to_string(),
            path: None,
        });
        return report(errors);
    }

    let raw_bytes = match fs::read(&manifest_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            errors.push(IntegrityError {
                code: IntegrityErrorCode::ManifestNotFound,
                message: format!("evidence/manifest.json unreadable: {}", e.kind()),
                path: None,
            });
            return report(errors);
        },
    };

    let parsed: serde_json::Value = match serde_json::from_slice(&raw_bytes) {
        Ok(value) => value,
        Err(e) => {
            errors.push(IntegrityError {
                code: IntegrityErrorCode::ManifestParseError,
                message: format!("manifest is not well-formed JSON: {e}"),
                path: None,
            });
            return report(errors);
        },
    };

    let manifest: RawManifest = match serde_json::from_value(parsed) {
        Ok(manifest) => manifest,
        Err(e) => {
            errors.push(IntegrityError {
                code: IntegrityErrorCode::SchemaValidationError,
                message: format!("manifest does not match schema: {e}"),
                path: None,
            });
            return report(errors);
        },
    };

    validate_schema(&manifest, &mut errors);

    for artifact in &manifest.artifacts {
        validate_artifact(run_dir, artifact, &mut errors);
    }

    report(errors)
}

fn validate_schema(manifest: &RawManifest, errors: &mut Vec<IntegrityError>) {
    if manifest.manifest_version != MANIFEST_VERSION {
        errors.push(IntegrityError {
            code: IntegrityErrorCode::SchemaValidationError,
            message: format!(
                "unsupported manifestVersion '{}', expected '{MANIFEST_VERSION}'",
                manifest.manifest_version
            ),
            path: None,
        });
    }

    if !matches!(
        manifest.execution_summary.status.as_str(),
        "SUCCESS" | "FAILED" | "REFUSED"
    ) {
        errors.push(IntegrityError {
            code: IntegrityErrorCode::SchemaValidationError,
            message: format!(
                "unknown executionSummary.status '{}'",
                manifest.execution_summary.status
            ),
            path: None,
        });
    }

    let sorted = manifest
        .artifacts
        .windows(2)
        .all(|pair| pair[0].path < pair[1].path);
    if !sorted {
        errors.push(IntegrityError {
            code: IntegrityErrorCode::SchemaValidationError,
            message: "artifacts are not sorted by path ascending".to_string(),
            path: None,
        });
    }

    for artifact in &manifest.artifacts {
        let hex_ok = artifact.sha256.len() == 64
            && artifact
                .sha256
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !hex_ok {
            errors.push(IntegrityError {
                code: IntegrityErrorCode::SchemaValidationError,
                message: "sha256 is not 64 lowercase hex chars".to_string(),
                path: Some(artifact.path.clone()),
            });
        }
    }
}

fn validate_artifact(run_dir: &Path, artifact: &RawArtifact, errors: &mut Vec<IntegrityError>) {
    // Path checks come first and never touch the filesystem.
    if SafeRelPath::new(&artifact.path).is_err() {
        errors.push(IntegrityError {
            code: IntegrityErrorCode::UnsafePath,
            message: "artifact path fails the safety predicate".to_string(),
            path: Some(artifact.path.clone()),
        });
        return;
    }

    if !artifact.path.starts_with("artifacts/") {
        errors.push(IntegrityError {
            code: IntegrityErrorCode::SchemaValidationError,
            message: "artifact path must begin with 'artifacts/'".to_string(),
            path: Some(artifact.path.clone()),
        });
        return;
    }

    let Some(absolute) = safe_join(run_dir, &artifact.path) else {
        errors.push(IntegrityError {
            code: IntegrityErrorCode::PathEscape,
            message: "artifact path escapes the run directory".to_string(),
            path: Some(artifact.path.clone()),
        });
        return;
    };

    let metadata = match fs::metadata(&absolute) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => {
            errors.push(IntegrityError {
                code: IntegrityErrorCode::ArtifactNotFound,
                message: "artifact referenced by manifest is absent".to_string(),
                path: Some(artifact.path.clone()),
            });
            return;
        },
    };

    if metadata.len() != artifact.bytes {
        errors.push(IntegrityError {
            code: IntegrityErrorCode::SizeMismatch,
            message: format!(
                "size is {} bytes, manifest records {}",
                metadata.len(),
                artifact.bytes
            ),
            path: Some(artifact.path.clone()),
        });
        return;
    }

    match sha256_file(&absolute) {
        Ok((actual, _)) if actual == artifact.sha256 => {},
        Ok((actual, _)) => {
            errors.push(IntegrityError {
                code: IntegrityErrorCode::HashMismatch,
                message: format!(
                    "sha256 is {actual}, manifest records {}",
                    artifact.sha256
                ),
                path: Some(artifact.path.clone()),
            });
        },
        Err(e) => {
            errors.push(IntegrityError {
                code: IntegrityErrorCode::ArtifactNotFound,
                message: format!("artifact unreadable: {}", e.kind()),
                path: Some(artifact.path.clone()),
            });
        },
    }
}

fn report(errors: Vec<IntegrityError>) -> EvidenceReport {
    EvidenceReport {
        valid: errors.is_empty(),
        errors,
    }
}
