//! `solverctl run-fixture <file>`

use std::path::Path;
use std::sync::Arc;

use solver_core::clock::SystemClock;
use solver_core::crypto::LocalSigner;
use solver_core::evidence::ExecStatus;
use solver_core::pipeline::{RunOutcome, Solver, SolverError};

use super::{
    load_config, print_error_block, read_json_file, EXIT_EXECUTION_FAILED, EXIT_FAILURE,
    EXIT_REFUSED,
};

/// Runs an intent fixture through the full pipeline.
pub fn run(config_file: Option<&Path>, file: &Path, signing_key: Option<&str>) -> u8 {
    let config = match load_config(config_file) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let raw = match read_json_file(file) {
        Ok(raw) => raw,
        Err(code) => return code,
    };

    let mut solver = Solver::new(config, Arc::new(SystemClock));
    if let Some(hex_key) = signing_key {
        match parse_signing_key(hex_key) {
            Ok(signer) => solver = solver.with_signer(Arc::new(signer)),
            Err(message) => {
                print_error_block("SIGNER_ERROR", None, &message);
                return EXIT_FAILURE;
            },
        }
    }

    // Startup hygiene before the run.
    if let Err(e) = solver.reap_orphan_temps() {
        print_error_block("IO_ERROR", None, &e.to_string());
        return EXIT_FAILURE;
    }

    match solver.run_value(&raw) {
        Ok(RunOutcome::Refused { refusal }) => {
            if let Ok(rendered) = serde_json::to_string_pretty(&refusal) {
                println!("{rendered}");
            }
            EXIT_REFUSED
        },
        Ok(RunOutcome::Completed { receipt, .. }) => {
            let code = match receipt.status {
                ExecStatus::Success => 0,
                _ => EXIT_EXECUTION_FAILED,
            };
            if let Ok(rendered) = serde_json::to_string_pretty(&receipt) {
                println!("{rendered}");
            }
            code
        },
        Err(SolverError::Validation(failure)) => {
            for error in &failure.errors {
                print_error_block("VALIDATION_ERROR", Some(&error.path), &error.message);
            }
            EXIT_FAILURE
        },
        Err(e) => {
            print_error_block("RUN_ERROR", None, &e.to_string());
            EXIT_FAILURE
        },
    }
}

fn parse_signing_key(hex_key: &str) -> Result<LocalSigner, String> {
    let mut secret = [0u8; 32];
    hex::decode_to_slice(hex_key, &mut secret)
        .map_err(|_| "signing key must be 64 hex chars".to_string())?;
    LocalSigner::from_bytes(&secret).map_err(|e| e.to_string())
}
