//! Evidence bundle assembly.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use super::manifest::{
    content_type_for, manifest_digest, ArtifactEntry, EvidenceManifest, ExecutionSummary,
    SolverInfo, MANIFEST_VERSION,
};
use super::sha256_file;
use crate::canonical::EncodingError;
use crate::policy::PolicyDecision;
use crate::store::{ArtifactStore, SafeRelPath, StoreError, TMP_PREFIX};

/// Errors from evidence assembly.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EvidenceError {
    /// Filesystem failure in the artifact store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The manifest could not be canonically encoded.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// An artifact could not be hashed.
    #[error("hashing artifact {path}: {source}")]
    Hash {
        /// Relative path of the artifact.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An enumerated artifact path failed the safety predicate.
    ///
    /// Only reachable when something outside the store wrote into the run
    /// directory.
    #[error("artifact path failed safety predicate: {path}")]
    UnsafeArtifactPath {
        /// The offending path.
        path: String,
    },
}

/// A persisted evidence bundle.
#[derive(Debug, Clone)]
pub struct EvidenceOutput {
    /// The assembled manifest.
    pub manifest: EvidenceManifest,
    /// Hex SHA-256 of the canonical manifest with `createdAt` omitted.
    pub manifest_sha256: String,
    /// Absolute path of `evidence/manifest.json`.
    pub manifest_path: PathBuf,
}

/// Inputs to [`build_evidence`] describing the run being sealed.
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    /// Intent identifier.
    pub intent_id: String,
    /// Run identifier.
    pub run_id: String,
    /// Job type tag.
    pub job_type: String,
    /// The policy gate's decision.
    pub policy_decision: PolicyDecision,
    /// Terminal outcome.
    pub execution_summary: ExecutionSummary,
    /// Producer identity.
    pub solver: SolverInfo,
}

/// Assembles and persists the evidence manifest for a run directory.
///
/// Enumerates `{runDir}/artifacts`, hashes every file by streaming (skipping
/// in-flight `.tmp-*` files), sorts entries by path, computes the
/// time-independent digest, and atomically writes
/// `evidence/manifest.json` and `evidence/manifest.sha256`.
///
/// `created_at` is recorded in the manifest but never hashed.
///
/// # Errors
///
/// Returns [`EvidenceError`] on filesystem or encoding failure.
pub fn build_evidence(
    store: &ArtifactStore,
    run_dir: &Path,
    descriptor: RunDescriptor,
    created_at: DateTime<Utc>,
) -> Result<EvidenceOutput, EvidenceError> {
    let artifacts_dir = run_dir.join("artifacts");
    let mut entries = Vec::new();

    if artifacts_dir.is_dir() {
        // Already sorted by the store; paths are relative to artifacts/.
        for rel in store.list_files_recursive(&artifacts_dir)? {
            if rel
                .rsplit('/')
                .next()
                .is_some_and(|name| name.starts_with(TMP_PREFIX))
            {
                continue;
            }
            let manifest_rel = format!("artifacts/{rel}");
            let path = SafeRelPath::new(&manifest_rel).map_err(|_| {
                EvidenceError::UnsafeArtifactPath {
                    path: manifest_rel.clone(),
                }
            })?;
            let absolute = path.join_under(run_dir);
            let (sha256, bytes) = sha256_file(&absolute).map_err(|e| EvidenceError::Hash {
                path: manifest_rel.clone(),
                source: e,
            })?;
            entries.push(ArtifactEntry {
                content_type: content_type_for(path.as_str()).to_string(),
                path,
                sha256,
                bytes,
            });
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let manifest = EvidenceManifest {
        manifest_version: MANIFEST_VERSION.to_string(),
        intent_id: descriptor.intent_id,
        run_id: descriptor.run_id,
        job_type: descriptor.job_type,
        created_at,
        artifacts: entries,
        policy_decision: descriptor.policy_decision,
        execution_summary: descriptor.execution_summary,
        solver: descriptor.solver,
    };

    let manifest_sha256 = manifest_digest(&manifest)?;

    let manifest_rel = SafeRelPath::new("evidence/manifest.json").expect("literal path is safe");
    let digest_rel = SafeRelPath::new("evidence/manifest.sha256").expect("literal path is safe");
    store.write_artifact(run_dir, &manifest_rel, &manifest.to_disk_bytes()?)?;
    store.write_artifact(run_dir, &digest_rel, format!("{manifest_sha256}\n").as_bytes())?;

    debug!(
        run_id = %manifest.run_id,
        %manifest_sha256, "evidence manifest persisted"
    );

    Ok(EvidenceOutput {
        manifest_path: manifest_rel.join_under(run_dir),
        manifest,
        manifest_sha256,
    })
}
