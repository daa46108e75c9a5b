//! `solverctl check-config`

use std::path::Path;

use serde_json::json;

use super::{load_config, print_error_block, EXIT_FAILURE};

/// Loads, validates, and summarizes the merged configuration.
pub fn run(config_file: Option<&Path>) -> u8 {
    let config = match load_config(config_file) {
        Ok(config) => config,
        Err(code) => return code,
    };

    if let Err(e) = config.check() {
        print_error_block("CONFIG_ERROR", None, &e.to_string());
        return EXIT_FAILURE;
    }

    let summary = json!({
        "dataDir": config.data_dir,
        "receiptsPath": config.receipts_path,
        "refusalsPath": config.refusals_path,
        "evidenceDir": config.evidence_dir,
        "policy": {
            "jobtypeAllowlist": config.policy.jobtype_allowlist,
            "maxArtifactMb": config.policy.max_artifact_mb,
            "requesterAllowlist": config.policy.requester_allowlist,
        },
        "fsync": config.fsync,
    });
    println!("{summary:#}");
    0
}
