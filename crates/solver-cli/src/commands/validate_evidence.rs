//! `solverctl validate-evidence <runDir>`

use std::path::Path;

use solver_core::evidence::validate_evidence;

use super::{print_error_block, EXIT_FAILURE};

/// Verifies an evidence bundle.
pub fn run(run_dir: &Path) -> u8 {
    let report = validate_evidence(run_dir);
    if report.valid {
        println!("{{\"valid\":true}}");
        return 0;
    }
    for error in &report.errors {
        print_error_block(error.code.as_str(), error.path.as_deref(), &error.message);
    }
    EXIT_FAILURE
}
