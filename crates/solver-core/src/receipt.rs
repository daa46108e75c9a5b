//! Receipts: the structured pointer from an intent to its evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::RecoverableSignature;
use crate::evidence::ExecStatus;

/// The receipt schema version this solver writes.
pub const RECEIPT_VERSION: &str = "0.1.0";

/// One delivered artifact referenced from a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredArtifact {
    /// Path relative to the run directory.
    pub path: String,
    /// Lowercase hex SHA-256 of the artifact bytes.
    pub sha256: String,
}

/// Pointer from a receipt to its evidence manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePointer {
    /// The manifest digest the receipt binds to.
    pub manifest_sha256: String,
    /// Manifest path relative to the run directory.
    pub manifest_path: String,
}

/// A full receipt for one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Receipt schema version.
    pub receipt_version: String,
    /// Derived receipt identifier.
    pub receipt_id: String,
    /// Intent identifier.
    pub intent_id: String,
    /// Run identifier.
    pub run_id: String,
    /// Terminal status of the run.
    pub status: ExecStatus,
    /// Artifacts delivered by the run.
    pub delivered: Vec<DeliveredArtifact>,
    /// Evidence binding.
    pub evidence: EvidencePointer,
    /// When the receipt was emitted (injected clock). Informational.
    pub created_at: DateTime<Utc>,
    /// Optional signature over the manifest digest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<RecoverableSignature>,
}

impl Receipt {
    /// The one-line form appended to `receipts.jsonl`.
    #[must_use]
    pub fn to_record(&self) -> ReceiptRecord {
        ReceiptRecord {
            receipt_id: self.receipt_id.clone(),
            intent_id: self.intent_id.clone(),
            run_id: self.run_id.clone(),
            status: self.status,
            manifest_sha256: self.evidence.manifest_sha256.clone(),
            created_at: self.created_at,
            signature: self.signature.clone(),
        }
    }
}

/// One line of the append-only receipt log.
///
/// Readers must tolerate duplicates keyed by `receiptId`: a crash between
/// manifest rename and receipt append is completed idempotently on re-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRecord {
    /// Derived receipt identifier.
    pub receipt_id: String,
    /// Intent identifier.
    pub intent_id: String,
    /// Run identifier.
    pub run_id: String,
    /// Terminal status of the run.
    pub status: ExecStatus,
    /// The manifest digest the receipt binds to.
    pub manifest_sha256: String,
    /// When the receipt was emitted.
    pub created_at: DateTime<Utc>,
    /// Optional signature over the manifest digest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<RecoverableSignature>,
}
