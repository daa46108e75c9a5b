//! Job execution: runner registry and dispatch.
//!
//! A runner turns a normalized intent into artifact bytes. It never touches
//! the filesystem itself; the executor commits the returned artifacts in one
//! atomic batch, so a failing runner leaves nothing observable.
//!
//! Determinism contract for runners: no wall clock, no entropy, mappings
//! iterated in sorted key order, locale-independent numeric formatting,
//! UTF-8 text.

mod safe_report;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::intent::NormalizedIntent;
use crate::store::{ArtifactStore, SafeRelPath, StoreError, WrittenArtifact};

pub use safe_report::{SafeReportRunner, REPORT_VERSION};

/// Read-only environment handed to a runner for one execution.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Intent identifier.
    pub intent_id: String,
    /// Run identifier; names the run directory.
    pub run_id: String,
    /// Job type tag.
    pub job_type: String,
    /// Root data directory.
    pub data_dir: PathBuf,
    /// `{dataDir}/runs/{runId}/artifacts`.
    pub artifacts_dir: PathBuf,
    /// Requester identity, for logging correlation only.
    pub requester: String,
}

impl RunContext {
    /// Builds the context for one run of `intent`.
    #[must_use]
    pub fn new(store: &ArtifactStore, intent: &NormalizedIntent, run_id: &str) -> Self {
        let run_dir = store.run_dir(run_id);
        Self {
            intent_id: intent.intent_id.clone(),
            run_id: run_id.to_string(),
            job_type: intent.job_type.clone(),
            data_dir: store.data_dir().to_path_buf(),
            artifacts_dir: run_dir.join("artifacts"),
            requester: intent.requester.clone(),
        }
    }

    /// `{dataDir}/runs/{runId}`.
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.data_dir.join("runs").join(&self.run_id)
    }
}

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// The runner produced its artifacts and they were committed.
    Success,
    /// The runner failed; no artifacts were committed.
    Failed,
}

/// Outcome of dispatching one intent to its runner.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Terminal status.
    pub status: RunStatus,
    /// Artifacts committed to the run directory (empty on failure).
    pub artifacts: Vec<WrittenArtifact>,
    /// Sanitized failure reason when `status` is [`RunStatus::Failed`].
    pub error: Option<String>,
}

/// An artifact produced by a runner, not yet committed.
#[derive(Debug, Clone)]
pub struct ProducedArtifact {
    /// Target path relative to the run directory, beginning `artifacts/`.
    pub path: SafeRelPath,
    /// Artifact bytes.
    pub bytes: Vec<u8>,
}

/// A runner failure. The message must not contain absolute paths or stack
/// frames; it is persisted verbatim into the evidence manifest.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RunnerError {
    /// Sanitized description of the failure.
    pub message: String,
}

impl RunnerError {
    /// Builds a runner error from a message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A job implementation.
pub trait JobRunner: Send + Sync {
    /// The wire tag this runner handles.
    fn job_type(&self) -> &'static str;

    /// Produces the artifacts for one intent.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] with a sanitized message on failure.
    fn run(
        &self,
        intent: &NormalizedIntent,
        ctx: &RunContext,
    ) -> Result<Vec<ProducedArtifact>, RunnerError>;
}

/// Registry of runners, dispatching by job type tag.
pub struct JobExecutor {
    runners: BTreeMap<&'static str, Box<dyn JobRunner>>,
    store: ArtifactStore,
}

impl JobExecutor {
    /// Creates an executor with an empty registry.
    #[must_use]
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            runners: BTreeMap::new(),
            store,
        }
    }

    /// Creates an executor with the built-in runners registered.
    #[must_use]
    pub fn with_default_runners(store: ArtifactStore) -> Self {
        let mut executor = Self::new(store);
        executor.register(Box::new(SafeReportRunner));
        executor
    }

    /// Registers a runner, replacing any previous runner for the same tag.
    pub fn register(&mut self, runner: Box<dyn JobRunner>) {
        self.runners.insert(runner.job_type(), runner);
    }

    /// Dispatches an intent to the runner for its job type and commits the
    /// produced artifacts in one atomic batch.
    ///
    /// A runner failure is not an `Err`: it yields a [`RunStatus::Failed`]
    /// result with nothing committed. Only filesystem trouble while
    /// committing surfaces as an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the artifact batch cannot be committed.
    pub fn execute(
        &self,
        intent: &NormalizedIntent,
        ctx: &RunContext,
    ) -> Result<RunResult, StoreError> {
        let Some(runner) = self.runners.get(ctx.job_type.as_str()) else {
            return Ok(RunResult {
                status: RunStatus::Failed,
                artifacts: Vec::new(),
                error: Some(format!(
                    "no runner registered for jobType '{}'",
                    ctx.job_type
                )),
            });
        };

        let produced = match runner.run(intent, ctx) {
            Ok(produced) => produced,
            Err(e) => {
                return Ok(RunResult {
                    status: RunStatus::Failed,
                    artifacts: Vec::new(),
                    error: Some(sanitize_error(&e.message, ctx)),
                });
            },
        };

        let entries: Vec<(SafeRelPath, Vec<u8>)> = produced
            .into_iter()
            .map(|a| (a.path, a.bytes))
            .collect();
        let run_dir = ctx.run_dir();
        let artifacts = self.store.write_artifacts_batch(&run_dir, &entries)?;
        debug!(
            run_id = %ctx.run_id,
            count = artifacts.len(),
            "committed artifact batch"
        );

        Ok(RunResult {
            status: RunStatus::Success,
            artifacts,
            error: None,
        })
    }
}

/// Strips host paths out of a runner message before it is persisted.
fn sanitize_error(message: &str, ctx: &RunContext) -> String {
    let data_dir = ctx.data_dir.to_string_lossy();
    message.replace(data_dir.as_ref(), "<dataDir>")
}
