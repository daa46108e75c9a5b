//! Exit-code mapping for the CLI commands, driven through the command
//! functions with a file-based configuration.

use std::path::{Path, PathBuf};

fn write_config(dir: &Path) -> PathBuf {
    let config_path = dir.join("solver.toml");
    let data_dir = dir.join("data");
    std::fs::write(
        &config_path,
        format!("data_dir = {:?}\nfsync = false\n", data_dir.to_str().unwrap()),
    )
    .unwrap();
    config_path
}

fn write_intent(dir: &Path, value: &serde_json::Value) -> PathBuf {
    let path = dir.join("intent.json");
    std::fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    path
}

fn accepted_intent() -> serde_json::Value {
    serde_json::json!({
        "intentVersion": "0.1.0",
        "requester": "test@example.com",
        "createdAt": "2026-01-01T00:00:00.000Z",
        "jobType": "SAFE_REPORT",
        "inputs": {"subject": "Hi", "data": {"k": "v"}},
    })
}

use solver_cli::commands;

#[test]
fn check_config_accepts_file_config() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    assert_eq!(commands::check_config::run(Some(&config)), 0);
}

#[test]
fn check_config_rejects_malformed_file() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("broken.toml");
    std::fs::write(&config, "not toml [").unwrap();
    assert_eq!(commands::check_config::run(Some(&config)), 1);
}

#[test]
fn print_intent_maps_validation_to_exit_1() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());

    let good = write_intent(tmp.path(), &accepted_intent());
    assert_eq!(commands::print_intent::run(Some(&config), &good), 0);

    let mut bad_value = accepted_intent();
    bad_value["intentVersion"] = serde_json::json!("9.9.9");
    let bad = write_intent(tmp.path(), &bad_value);
    assert_eq!(commands::print_intent::run(Some(&config), &bad), 1);

    let missing = tmp.path().join("absent.json");
    assert_eq!(commands::print_intent::run(Some(&config), &missing), 1);
}

#[test]
fn run_fixture_success_refusal_and_failure_codes() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());

    // Success.
    let good = write_intent(tmp.path(), &accepted_intent());
    assert_eq!(commands::run_fixture::run(Some(&config), &good, None), 0);

    // Refusal: unknown job type.
    let mut refused_value = accepted_intent();
    refused_value["jobType"] = serde_json::json!("UNKNOWN");
    let refused = write_intent(tmp.path(), &refused_value);
    assert_eq!(commands::run_fixture::run(Some(&config), &refused, None), 2);
    assert!(tmp.path().join("data/refusals.jsonl").is_file());

    // Parse failure.
    let garbled = tmp.path().join("garbled.json");
    std::fs::write(&garbled, "{ nope").unwrap();
    assert_eq!(commands::run_fixture::run(Some(&config), &garbled, None), 1);
}

#[test]
fn run_fixture_with_signing_key() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    let good = write_intent(tmp.path(), &accepted_intent());

    let key = "42".repeat(32);
    assert_eq!(
        commands::run_fixture::run(Some(&config), &good, Some(&key)),
        0
    );
    let receipts = std::fs::read_to_string(tmp.path().join("data/receipts.jsonl")).unwrap();
    assert!(receipts.contains("\"signature\""));

    assert_eq!(
        commands::run_fixture::run(Some(&config), &good, Some("nothex")),
        1
    );
}

#[test]
fn validate_evidence_maps_validity_to_exit_code() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    let good = write_intent(tmp.path(), &accepted_intent());
    assert_eq!(commands::run_fixture::run(Some(&config), &good, None), 0);

    let runs = tmp.path().join("data/runs");
    let run_dir = std::fs::read_dir(&runs)
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    assert_eq!(commands::validate_evidence::run(&run_dir), 0);

    // Tamper and expect failure.
    let target = run_dir.join("artifacts/report.json");
    let mut bytes = std::fs::read(&target).unwrap();
    bytes[0] ^= 0x01;
    std::fs::write(&target, &bytes).unwrap();
    assert_eq!(commands::validate_evidence::run(&run_dir), 1);

    // Empty directory: manifest not found.
    let empty = tmp.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();
    assert_eq!(commands::validate_evidence::run(&empty), 1);
}

#[test]
fn make_evidence_refreshes_existing_bundle() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    let good = write_intent(tmp.path(), &accepted_intent());
    assert_eq!(commands::run_fixture::run(Some(&config), &good, None), 0);

    let runs = tmp.path().join("data/runs");
    let run_dir = std::fs::read_dir(&runs)
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();

    // Add an artifact out of band, then rebuild the manifest.
    std::fs::write(run_dir.join("artifacts/extra.txt"), b"more").unwrap();
    assert_eq!(commands::make_evidence::run(Some(&config), &run_dir), 0);

    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(run_dir.join("evidence/manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["artifacts"].as_array().unwrap().len(), 3);
    assert_eq!(commands::validate_evidence::run(&run_dir), 0);

    // Missing directory fails.
    assert_eq!(
        commands::make_evidence::run(Some(&config), &tmp.path().join("nope")),
        1
    );
}
