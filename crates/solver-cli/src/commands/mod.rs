//! Subcommand implementations.
//!
//! Every command returns its process exit code: 0 success, 1 for
//! configuration, validation, or I/O trouble, 2 for a policy refusal, 3 for
//! a job execution failure. Errors print as one structured JSON block per
//! error on stderr; payloads print on stdout.

pub mod check_config;
pub mod make_evidence;
pub mod print_intent;
pub mod run_fixture;
pub mod validate_evidence;

use serde_json::json;

/// Exit code for configuration, validation, parse, and I/O failures.
pub const EXIT_FAILURE: u8 = 1;

/// Exit code for a policy refusal.
pub const EXIT_REFUSED: u8 = 2;

/// Exit code for a job execution failure.
pub const EXIT_EXECUTION_FAILED: u8 = 3;

/// Prints one structured error block to stderr.
pub fn print_error_block(code: &str, path: Option<&str>, message: &str) {
    let mut block = json!({
        "code": code,
        "message": message,
    });
    if let Some(path) = path {
        block["path"] = json!(path);
    }
    eprintln!("{block}");
}

/// Loads the merged configuration, printing an error block on failure.
pub fn load_config(
    file: Option<&std::path::Path>,
) -> Result<solver_core::SolverConfig, u8> {
    match solver_core::SolverConfig::load(file) {
        Ok(config) => Ok(config),
        Err(e) => {
            print_error_block("CONFIG_ERROR", None, &e.to_string());
            Err(EXIT_FAILURE)
        },
    }
}

/// Reads and parses a JSON file, printing an error block on failure.
pub fn read_json_file(path: &std::path::Path) -> Result<serde_json::Value, u8> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            print_error_block(
                "IO_ERROR",
                path.to_str(),
                &format!("reading file: {}", e.kind()),
            );
            return Err(EXIT_FAILURE);
        },
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            print_error_block("PARSE_ERROR", path.to_str(), &e.to_string());
            Err(EXIT_FAILURE)
        },
    }
}
