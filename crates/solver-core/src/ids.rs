//! Identifier derivation for intents, runs, and receipts.
//!
//! Three pure formulas, each a SHA-256 over a domain-separated canonical byte
//! sequence. Each layer narrows the equivalence class: `intent_id` dedupes
//! semantically identical requests irrespective of client clocks, `run_id`
//! indexes one execution instance, and `receipt_id` binds a run to concrete
//! evidence bytes.
//!
//! No I/O, no clock, no entropy: the same inputs yield bit-identical output
//! on any host.

use serde_json::Value;
use sha2::{Digest as _, Sha256};
use sha3::Keccak256;

use crate::canonical::{to_canonical_string, EncodingError};

/// Domain prefix for intent identifiers.
pub const INTENT_ID_PREFIX: &str = "intent:";

/// Domain prefix for run identifiers.
pub const RUN_ID_PREFIX: &str = "run:";

/// Domain prefix for receipt identifiers.
pub const RECEIPT_ID_PREFIX: &str = "receipt:";

/// Derives the intent identifier.
///
/// `SHA256("intent:" || intentVersion || ":" || requester || ":" ||
/// canonical(jobType) || ":" || canonical(inputs) || ":" ||
/// canonical(constraints ?? {}))`, hex-lowercase.
///
/// `createdAt`, `expiresAt`, `meta`, and `acceptanceCriteria` are
/// deliberately excluded: two requests that differ only in client clock or
/// annotations are the same intent.
///
/// # Errors
///
/// Returns [`EncodingError`] if `inputs` or `constraints` violate the
/// canonical profile.
pub fn intent_id(
    intent_version: &str,
    requester: &str,
    job_type: &str,
    inputs: &Value,
    constraints: Option<&Value>,
) -> Result<String, EncodingError> {
    let empty = Value::Object(serde_json::Map::new());
    let canonical_job_type = to_canonical_string(&Value::String(job_type.to_string()))?;
    let canonical_inputs = to_canonical_string(inputs)?;
    let canonical_constraints = to_canonical_string(constraints.unwrap_or(&empty))?;

    let mut hasher = Sha256::new();
    hasher.update(INTENT_ID_PREFIX.as_bytes());
    hasher.update(intent_version.as_bytes());
    hasher.update(b":");
    hasher.update(requester.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_job_type.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_inputs.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_constraints.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Derives the run identifier.
///
/// `SHA256("run:" || intentId || ":" || jobType || ":" || canonical(inputs))`.
///
/// # Errors
///
/// Returns [`EncodingError`] if `inputs` violate the canonical profile.
pub fn run_id(intent_id: &str, job_type: &str, inputs: &Value) -> Result<String, EncodingError> {
    let canonical_inputs = to_canonical_string(inputs)?;

    let mut hasher = Sha256::new();
    hasher.update(RUN_ID_PREFIX.as_bytes());
    hasher.update(intent_id.as_bytes());
    hasher.update(b":");
    hasher.update(job_type.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_inputs.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Derives the receipt identifier.
///
/// `SHA256("receipt:" || intentId || ":" || runId || ":" || manifestSha256)`.
#[must_use]
pub fn receipt_id(intent_id: &str, run_id: &str, manifest_sha256: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(RECEIPT_ID_PREFIX.as_bytes());
    hasher.update(intent_id.as_bytes());
    hasher.update(b":");
    hasher.update(run_id.as_bytes());
    hasher.update(b":");
    hasher.update(manifest_sha256.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derives the keccak-based on-chain receipt identifier.
///
/// Alignment port for protocols anchoring receipts with
/// `keccak256(intentHash || solverId || createdAt)`. The off-chain records
/// keep the SHA-256 derivation; this function exists so an anchoring adapter
/// can compute the on-chain identifier from the same inputs. `created_at` is
/// the on-chain timestamp, encoded as 32 big-endian bytes.
#[must_use]
pub fn keccak_receipt_id(intent_hash: &[u8; 32], solver_id: &[u8; 32], created_at: u64) -> String {
    let mut ts = [0u8; 32];
    ts[24..].copy_from_slice(&created_at.to_be_bytes());

    let mut hasher = Keccak256::new();
    hasher.update(intent_hash);
    hasher.update(solver_id);
    hasher.update(ts);
    hex::encode(hasher.finalize())
}

/// Returns true if `s` is a 64-char lowercase hex digest.
///
/// Run directories are named by `run_id`, so this predicate is what makes
/// path traversal through identifiers structurally impossible.
#[must_use]
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
