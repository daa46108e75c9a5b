//! `solverctl print-intent <file>`

use std::path::Path;

use solver_core::intent::validate_intent;

use super::{load_config, print_error_block, read_json_file, EXIT_FAILURE};

/// Validates an intent file and prints the normalized intent.
pub fn run(config_file: Option<&Path>, file: &Path) -> u8 {
    let config = match load_config(config_file) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let raw = match read_json_file(file) {
        Ok(raw) => raw,
        Err(code) => return code,
    };

    match validate_intent(&raw, config.intent_id_mode) {
        Ok(intent) => {
            match serde_json::to_string_pretty(&intent) {
                Ok(rendered) => println!("{rendered}"),
                Err(e) => {
                    print_error_block("ENCODING_ERROR", None, &e.to_string());
                    return EXIT_FAILURE;
                },
            }
            0
        },
        Err(failure) => {
            for error in &failure.errors {
                print_error_block("VALIDATION_ERROR", Some(&error.path), &error.message);
            }
            EXIT_FAILURE
        },
    }
}
