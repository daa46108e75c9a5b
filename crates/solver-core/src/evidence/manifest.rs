//! Evidence manifest types and the time-independent manifest digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::canonical::{to_canonical_string, EncodingError};
use crate::policy::PolicyDecision;
use crate::store::SafeRelPath;

/// The manifest schema version this solver writes.
pub const MANIFEST_VERSION: &str = "0.1.0";

/// One artifact listed in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    /// Path relative to the run directory, beginning `artifacts/`.
    pub path: SafeRelPath,
    /// Lowercase hex SHA-256 of the artifact bytes.
    pub sha256: String,
    /// Size in bytes.
    pub bytes: u64,
    /// MIME type, derived from the file extension.
    pub content_type: String,
}

/// Terminal status recorded in the execution summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    /// The job ran and its artifacts were committed.
    Success,
    /// The job failed; the manifest records the sanitized reason.
    Failed,
    /// The policy gate refused the intent before execution.
    Refused,
}

/// Outcome summary embedded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    /// Terminal status of the run.
    pub status: ExecStatus,
    /// Sanitized failure reason, present only when the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Identity of the solver that produced a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverInfo {
    /// Service name.
    pub service: String,
    /// Service version.
    pub service_version: String,
    /// Git commit the service was built from, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
}

/// The evidence manifest written to `evidence/manifest.json`.
///
/// Invariants: every artifact path passes the safety predicate, `artifacts`
/// is sorted by path ascending, and `createdAt` is informational only (the
/// digest excludes it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceManifest {
    /// Manifest schema version.
    pub manifest_version: String,
    /// Intent identifier.
    pub intent_id: String,
    /// Run identifier.
    pub run_id: String,
    /// Job type tag.
    pub job_type: String,
    /// When the manifest was assembled. Never hashed.
    pub created_at: DateTime<Utc>,
    /// Artifact entries, sorted by path ascending.
    pub artifacts: Vec<ArtifactEntry>,
    /// The policy gate's decision for this run.
    pub policy_decision: PolicyDecision,
    /// Terminal outcome of the run.
    pub execution_summary: ExecutionSummary,
    /// Producer identity.
    pub solver: SolverInfo,
}

impl EvidenceManifest {
    /// The canonical on-disk bytes: canonical JSON plus one trailing
    /// newline. The newline is a file-level convenience and is not part of
    /// the hashed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError`] if the manifest cannot be canonically
    /// encoded.
    pub fn to_disk_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        let value = manifest_value(self)?;
        let mut bytes = to_canonical_string(&value)?.into_bytes();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Computes the manifest digest: SHA-256 over the canonical serialization
/// with `createdAt` omitted.
///
/// Changing only `createdAt` never changes the digest; changing any
/// artifact byte (and hence its entry) always does.
///
/// # Errors
///
/// Returns [`EncodingError`] if the manifest cannot be canonically encoded.
pub fn manifest_digest(manifest: &EvidenceManifest) -> Result<String, EncodingError> {
    let mut value = manifest_value(manifest)?;
    if let Value::Object(obj) = &mut value {
        obj.remove("createdAt");
    }
    let canonical = to_canonical_string(&value)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

fn manifest_value(manifest: &EvidenceManifest) -> Result<Value, EncodingError> {
    serde_json::to_value(manifest).map_err(|e| EncodingError::ParseError {
        message: e.to_string(),
    })
}

/// Maps a file extension to the recorded content type.
#[must_use]
pub fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("json") => "application/json",
        Some("md") => "text/markdown",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
