//! `solverctl make-evidence <runDir>`
//!
//! Re-assembles the evidence manifest for a run directory. When a manifest
//! already exists its identity fields (ids, policy decision, execution
//! summary) are carried over and the artifact entries are re-derived from
//! the filesystem; otherwise a minimal identity is synthesized from the
//! directory name.

use std::path::Path;

use serde_json::json;
use solver_core::clock::{Clock, SystemClock};
use solver_core::evidence::{
    build_evidence, EvidenceManifest, ExecStatus, ExecutionSummary, RunDescriptor,
};
use solver_core::ids::is_hex_digest;
use solver_core::policy::PolicyDecision;
use solver_core::store::ArtifactStore;

use super::{load_config, print_error_block, EXIT_FAILURE};

/// Assembles and persists the evidence manifest for `run_dir`.
pub fn run(config_file: Option<&Path>, run_dir: &Path) -> u8 {
    let config = match load_config(config_file) {
        Ok(config) => config,
        Err(code) => return code,
    };

    if !run_dir.is_dir() {
        print_error_block("IO_ERROR", run_dir.to_str(), "run directory not found");
        return EXIT_FAILURE;
    }

    let descriptor = match existing_descriptor(run_dir) {
        Some(descriptor) => descriptor,
        None => synthesized_descriptor(run_dir, &config),
    };

    let store = ArtifactStore::new(run_dir.parent().unwrap_or(run_dir), config.fsync);
    match build_evidence(&store, run_dir, descriptor, SystemClock.now_utc()) {
        Ok(output) => {
            let summary = json!({
                "runId": output.manifest.run_id,
                "artifacts": output.manifest.artifacts.len(),
                "manifestSha256": output.manifest_sha256,
            });
            println!("{summary:#}");
            0
        },
        Err(e) => {
            print_error_block("EVIDENCE_ERROR", run_dir.to_str(), &e.to_string());
            EXIT_FAILURE
        },
    }
}

/// Carries identity fields over from an existing manifest.
fn existing_descriptor(run_dir: &Path) -> Option<RunDescriptor> {
    let raw = std::fs::read(run_dir.join("evidence/manifest.json")).ok()?;
    let manifest: EvidenceManifest = serde_json::from_slice(&raw).ok()?;
    Some(RunDescriptor {
        intent_id: manifest.intent_id,
        run_id: manifest.run_id,
        job_type: manifest.job_type,
        policy_decision: manifest.policy_decision,
        execution_summary: manifest.execution_summary,
        solver: manifest.solver,
    })
}

/// Minimal identity for a bare artifact directory.
fn synthesized_descriptor(run_dir: &Path, config: &solver_core::SolverConfig) -> RunDescriptor {
    let dir_name = run_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let run_id = if is_hex_digest(dir_name) {
        dir_name.to_string()
    } else {
        String::new()
    };
    RunDescriptor {
        intent_id: String::new(),
        run_id,
        job_type: String::new(),
        policy_decision: PolicyDecision::allow(),
        execution_summary: ExecutionSummary {
            status: ExecStatus::Success,
            error: None,
        },
        solver: config.solver_info(),
    }
}
