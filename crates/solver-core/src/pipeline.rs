//! The run pipeline: validate → policy → execute → evidence → receipt.
//!
//! Within one run the stages are strictly sequential. Across runs nothing
//! is ordered except the append logs, which linearize persisted records via
//! their lock. In-flight requests share only the immutable configuration,
//! the log files, and the metrics registry.
//!
//! Failure placement follows the manifest rename: anything that fails
//! before it aborts the run with no observable evidence; after it, the
//! evidence stands and the receipt append is completed idempotently on the
//! next identical run (duplicates are keyed by `receiptId`).

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info};

use crate::appendlog::{AppendLog, AppendLogError};
use crate::canonical::EncodingError;
use crate::clock::Clock;
use crate::config::SolverConfig;
use crate::crypto::{DigestSigner, SignerError};
use crate::evidence::{
    build_evidence, EvidenceError, EvidenceOutput, ExecStatus, ExecutionSummary, RunDescriptor,
};
use crate::executor::{JobExecutor, RunContext, RunStatus};
use crate::ids;
use crate::intent::{validate_intent, NormalizedIntent, ValidationFailure};
use crate::metrics::SolverMetrics;
use crate::policy::{self, RefusalRecord};
use crate::receipt::{DeliveredArtifact, EvidencePointer, Receipt, RECEIPT_VERSION};
use crate::store::{ArtifactStore, StoreError};

/// Errors that abort a run.
///
/// Refusals and job failures are not here: both are recorded outcomes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SolverError {
    /// The intent failed schema validation.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    /// A value violated the canonical profile.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Filesystem failure in the artifact store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Evidence assembly failed.
    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    /// A log append failed.
    #[error(transparent)]
    AppendLog(#[from] AppendLogError),

    /// The signer backend failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
}

/// Outcome of one pipeline invocation.
#[derive(Debug)]
pub enum RunOutcome {
    /// The policy gate refused the intent; a refusal record was appended.
    Refused {
        /// The persisted refusal.
        refusal: RefusalRecord,
    },
    /// The run completed (successfully or not) and evidence was sealed.
    Completed {
        /// The emitted receipt.
        receipt: Receipt,
        /// The persisted evidence bundle.
        evidence: EvidenceOutput,
    },
}

/// The solver pipeline, wired once at startup.
pub struct Solver {
    config: SolverConfig,
    store: ArtifactStore,
    executor: JobExecutor,
    clock: Arc<dyn Clock>,
    signer: Option<Arc<dyn DigestSigner>>,
    metrics: Option<SolverMetrics>,
    receipts: AppendLog,
    refusals: AppendLog,
}

impl Solver {
    /// Wires a solver from configuration with the default runner registry.
    #[must_use]
    pub fn new(config: SolverConfig, clock: Arc<dyn Clock>) -> Self {
        let store = ArtifactStore::new(&config.evidence_dir, config.fsync);
        let executor = JobExecutor::with_default_runners(store.clone());
        let receipts = AppendLog::new(&config.receipts_path, config.fsync);
        let refusals = AppendLog::new(&config.refusals_path, config.fsync);
        Self {
            config,
            store,
            executor,
            clock,
            signer: None,
            metrics: None,
            receipts,
            refusals,
        }
    }

    /// Attaches a digest signer; receipts will carry signatures.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn DigestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Attaches metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SolverMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The wired configuration.
    #[must_use]
    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The artifact store rooted at the evidence directory.
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Runs one decoded intent through the full pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError`] when the run aborts: schema validation,
    /// encoding, I/O, or signer failure. A policy refusal or a failed job
    /// is an `Ok` outcome.
    pub fn run_value(&self, raw: &serde_json::Value) -> Result<RunOutcome, SolverError> {
        let intent = validate_intent(raw, self.config.intent_id_mode)?;
        self.run_intent(&intent)
    }

    /// Runs a normalized intent through policy, execution, and evidence.
    ///
    /// # Errors
    ///
    /// See [`Self::run_value`].
    pub fn run_intent(&self, intent: &NormalizedIntent) -> Result<RunOutcome, SolverError> {
        let started = Instant::now();
        let run_id = ids::run_id(&intent.intent_id, &intent.job_type, &intent.inputs_value())?;

        let decision = policy::evaluate(intent, &self.config.policy, self.clock.as_ref())?;
        if !decision.allowed {
            let refusal = RefusalRecord {
                timestamp: self.clock.now_utc(),
                intent_id: intent.intent_id.clone(),
                run_id,
                job_type: intent.job_type.clone(),
                requester: intent.requester.clone(),
                reasons: decision.reasons,
                intent_version: intent.intent_version.clone(),
            };
            self.refusals.append(&refusal)?;
            if let Some(metrics) = &self.metrics {
                metrics.refusals_total.inc();
            }
            info!(
                intent_id = %refusal.intent_id,
                run_id = %refusal.run_id,
                reasons = refusal.reasons.len(),
                "intent refused by policy"
            );
            return Ok(RunOutcome::Refused { refusal });
        }

        let ctx = RunContext::new(&self.store, intent, &run_id);
        let result = self.executor.execute(intent, &ctx)?;
        let status = match result.status {
            RunStatus::Success => ExecStatus::Success,
            RunStatus::Failed => ExecStatus::Failed,
        };
        if status == ExecStatus::Failed {
            if let Some(metrics) = &self.metrics {
                metrics.run_failures_total.inc();
            }
            error!(
                intent_id = %intent.intent_id,
                %run_id,
                error = result.error.as_deref().unwrap_or(""),
                "job execution failed"
            );
        }

        let evidence = build_evidence(
            &self.store,
            &ctx.run_dir(),
            RunDescriptor {
                intent_id: intent.intent_id.clone(),
                run_id: run_id.clone(),
                job_type: intent.job_type.clone(),
                policy_decision: decision,
                execution_summary: ExecutionSummary {
                    status,
                    error: result.error,
                },
                solver: self.config.solver_info(),
            },
            self.clock.now_utc(),
        )?;

        let receipt_id = ids::receipt_id(&intent.intent_id, &run_id, &evidence.manifest_sha256);

        let signature = match &self.signer {
            Some(signer) => {
                let digest = decode_digest(&evidence.manifest_sha256)?;
                Some(signer.sign_digest(&digest)?)
            },
            None => None,
        };

        let receipt = Receipt {
            receipt_version: RECEIPT_VERSION.to_string(),
            receipt_id: receipt_id.clone(),
            intent_id: intent.intent_id.clone(),
            run_id: run_id.clone(),
            status,
            delivered: evidence
                .manifest
                .artifacts
                .iter()
                .map(|a| DeliveredArtifact {
                    path: a.path.as_str().to_string(),
                    sha256: a.sha256.clone(),
                })
                .collect(),
            evidence: EvidencePointer {
                manifest_sha256: evidence.manifest_sha256.clone(),
                manifest_path: "evidence/manifest.json".to_string(),
            },
            created_at: self.clock.now_utc(),
            signature,
        };

        // Idempotent append: a re-run after a crash between the manifest
        // rename and this append finds the record and does not duplicate it.
        if !self.receipts.contains_field("receiptId", &receipt_id)? {
            self.receipts.append(&receipt.to_record())?;
        }

        if let Some(metrics) = &self.metrics {
            metrics.runs_total.inc();
            metrics.receipts_total.inc();
            metrics
                .run_duration_seconds
                .observe(started.elapsed().as_secs_f64());
        }
        info!(
            intent_id = %intent.intent_id,
            %run_id, %receipt_id, status = ?status, "run completed"
        );

        Ok(RunOutcome::Completed { receipt, evidence })
    }

    /// Startup hygiene: sweep orphaned temp files older than an hour.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Store`] on filesystem failure.
    pub fn reap_orphan_temps(&self) -> Result<usize, SolverError> {
        Ok(self
            .store
            .reap_orphan_temps(std::time::Duration::from_secs(3600))?)
    }
}

fn decode_digest(hex_digest: &str) -> Result<[u8; 32], SolverError> {
    let mut digest = [0u8; 32];
    hex::decode_to_slice(hex_digest, &mut digest).map_err(|_| {
        SolverError::Encoding(EncodingError::ParseError {
            message: "manifest digest is not 64 hex chars".to_string(),
        })
    })?;
    Ok(digest)
}
