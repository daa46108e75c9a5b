//! Solver configuration.
//!
//! Configuration comes from enumerated environment variables with defaults,
//! optionally merged with a TOML file. The file overrides the environment;
//! unknown environment keys are ignored. The merged result is immutable for
//! the life of the process: requests share it read-only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::evidence::SolverInfo;
use crate::intent::IntentIdMode;
use crate::policy::PolicyConfig;

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Errors from configuration loading.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// An environment variable or file field holds an unusable value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// The configuration key.
        key: String,
        /// Why the value is unusable.
        message: String,
    },

    /// The config file could not be read.
    #[error("reading config file {}: {source}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML.
    #[error("parsing config file {}: {source}", path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: toml::de::Error,
    },
}

/// Immutable solver configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Root data directory.
    pub data_dir: PathBuf,
    /// Receipt log path. Default `{dataDir}/receipts.jsonl`.
    pub receipts_path: PathBuf,
    /// Refusal log path. Default `{dataDir}/refusals.jsonl`.
    pub refusals_path: PathBuf,
    /// Root for evidence bundles. Default `{dataDir}`.
    pub evidence_dir: PathBuf,
    /// Policy gate configuration.
    pub policy: PolicyConfig,
    /// Treatment of caller-provided intent ids.
    pub intent_id_mode: IntentIdMode,
    /// Whether renames are followed by file+directory fsync.
    pub fsync: bool,
    /// Git commit baked into manifests, when known.
    pub git_commit: Option<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::from_data_dir(PathBuf::from(DEFAULT_DATA_DIR))
    }
}

/// Partial configuration as read from a TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    receipts_path: Option<PathBuf>,
    refusals_path: Option<PathBuf>,
    evidence_dir: Option<PathBuf>,
    intent_id_mode: Option<IntentIdMode>,
    fsync: Option<bool>,
    git_commit: Option<String>,
    policy: Option<FilePolicyConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilePolicyConfig {
    jobtype_allowlist: Option<Vec<String>>,
    max_artifact_mb: Option<u64>,
    requester_allowlist: Option<Vec<String>>,
}

impl SolverConfig {
    /// Builds a configuration with every derived path rooted at `data_dir`.
    #[must_use]
    pub fn from_data_dir(data_dir: PathBuf) -> Self {
        let receipts_path = data_dir.join("receipts.jsonl");
        let refusals_path = data_dir.join("refusals.jsonl");
        let evidence_dir = data_dir.clone();
        Self {
            data_dir,
            receipts_path,
            refusals_path,
            evidence_dir,
            policy: PolicyConfig::default(),
            intent_id_mode: IntentIdMode::default(),
            fsync: true,
            git_commit: None,
        }
    }

    /// Loads configuration from the process environment, then merges an
    /// optional TOML file over it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on unusable values or file trouble.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        let mut config = Self::from_env_map(&vars)?;
        if let Some(path) = file {
            config.merge_file(path)?;
        }
        Ok(config)
    }

    /// Builds configuration from an explicit environment map.
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] on unusable values.
    pub fn from_env_map(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let data_dir = vars
            .get("DATA_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
        let mut config = Self::from_data_dir(data_dir);

        if let Some(raw) = vars.get("POLICY_JOBTYPE_ALLOWLIST") {
            config.policy.jobtype_allowlist = parse_list(raw);
            if config.policy.jobtype_allowlist.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "POLICY_JOBTYPE_ALLOWLIST".to_string(),
                    message: "allowlist must not be empty".to_string(),
                });
            }
        }

        if let Some(raw) = vars.get("POLICY_MAX_ARTIFACT_MB") {
            let parsed: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "POLICY_MAX_ARTIFACT_MB".to_string(),
                message: format!("'{raw}' is not a positive integer"),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "POLICY_MAX_ARTIFACT_MB".to_string(),
                    message: "must be positive".to_string(),
                });
            }
            config.policy.max_artifact_mb = parsed;
        }

        if let Some(raw) = vars.get("POLICY_REQUESTER_ALLOWLIST") {
            config.policy.requester_allowlist = Some(parse_list(raw));
        }

        if let Some(raw) = vars.get("RECEIPTS_PATH") {
            config.receipts_path = PathBuf::from(raw);
        }
        if let Some(raw) = vars.get("REFUSALS_PATH") {
            config.refusals_path = PathBuf::from(raw);
        }
        if let Some(raw) = vars.get("EVIDENCE_DIR") {
            config.evidence_dir = PathBuf::from(raw);
        }

        if let Some(raw) = vars.get("INTENT_ID_MODE") {
            config.intent_id_mode = match raw.as_str() {
                "strict" => IntentIdMode::Strict,
                "lenient" => IntentIdMode::Lenient,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "INTENT_ID_MODE".to_string(),
                        message: format!("'{other}' is not 'strict' or 'lenient'"),
                    });
                },
            };
        }

        if let Some(raw) = vars.get("FSYNC") {
            config.fsync = match raw.as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "FSYNC".to_string(),
                        message: format!("'{other}' is not a boolean"),
                    });
                },
            };
        }

        if let Some(raw) = vars.get("SOLVER_GIT_COMMIT") {
            config.git_commit = Some(raw.clone());
        }

        Ok(config)
    }

    /// Merges a TOML file over this configuration. File values win.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: FileConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        if let Some(data_dir) = file.data_dir {
            // Re-derive dependent defaults; explicit file paths are applied
            // below and win over these.
            self.receipts_path = data_dir.join("receipts.jsonl");
            self.refusals_path = data_dir.join("refusals.jsonl");
            self.evidence_dir = data_dir.clone();
            self.data_dir = data_dir;
        }
        if let Some(path) = file.receipts_path {
            self.receipts_path = path;
        }
        if let Some(path) = file.refusals_path {
            self.refusals_path = path;
        }
        if let Some(path) = file.evidence_dir {
            self.evidence_dir = path;
        }
        if let Some(mode) = file.intent_id_mode {
            self.intent_id_mode = mode;
        }
        if let Some(fsync) = file.fsync {
            self.fsync = fsync;
        }
        if let Some(commit) = file.git_commit {
            self.git_commit = Some(commit);
        }
        if let Some(policy) = file.policy {
            if let Some(list) = policy.jobtype_allowlist {
                self.policy.jobtype_allowlist = list;
            }
            if let Some(max) = policy.max_artifact_mb {
                self.policy.max_artifact_mb = max;
            }
            if let Some(list) = policy.requester_allowlist {
                self.policy.requester_allowlist = Some(list);
            }
        }
        Ok(())
    }

    /// Validates the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] describing the first problem.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.policy.jobtype_allowlist.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "policy.jobtype_allowlist".to_string(),
                message: "allowlist must not be empty".to_string(),
            });
        }
        if self.policy.max_artifact_mb == 0 {
            return Err(ConfigError::InvalidValue {
                key: "policy.max_artifact_mb".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "data_dir".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// The producer identity recorded in manifests.
    #[must_use]
    pub fn solver_info(&self) -> SolverInfo {
        SolverInfo {
            service: env!("CARGO_PKG_NAME").to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            git_commit: self.git_commit.clone(),
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = SolverConfig::from_env_map(&env(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.receipts_path, PathBuf::from("./data/receipts.jsonl"));
        assert_eq!(config.refusals_path, PathBuf::from("./data/refusals.jsonl"));
        assert_eq!(config.policy.jobtype_allowlist, vec!["SAFE_REPORT"]);
        assert_eq!(config.policy.max_artifact_mb, 5);
        assert!(config.policy.requester_allowlist.is_none());
        assert_eq!(config.intent_id_mode, IntentIdMode::Lenient);
        assert!(config.fsync);
        config.check().unwrap();
    }

    #[test]
    fn test_derived_paths_follow_data_dir() {
        let config = SolverConfig::from_env_map(&env(&[("DATA_DIR", "/var/solver")])).unwrap();
        assert_eq!(
            config.receipts_path,
            PathBuf::from("/var/solver/receipts.jsonl")
        );
        assert_eq!(config.evidence_dir, PathBuf::from("/var/solver"));
    }

    #[test]
    fn test_explicit_paths_override_derived() {
        let config = SolverConfig::from_env_map(&env(&[
            ("DATA_DIR", "/var/solver"),
            ("RECEIPTS_PATH", "/logs/receipts.jsonl"),
        ]))
        .unwrap();
        assert_eq!(config.receipts_path, PathBuf::from("/logs/receipts.jsonl"));
        assert_eq!(
            config.refusals_path,
            PathBuf::from("/var/solver/refusals.jsonl")
        );
    }

    #[test]
    fn test_allowlists_parse_comma_separated() {
        let config = SolverConfig::from_env_map(&env(&[
            ("POLICY_JOBTYPE_ALLOWLIST", "SAFE_REPORT, OTHER_JOB"),
            ("POLICY_REQUESTER_ALLOWLIST", "a@x.com,b@x.com"),
        ]))
        .unwrap();
        assert_eq!(
            config.policy.jobtype_allowlist,
            vec!["SAFE_REPORT", "OTHER_JOB"]
        );
        assert_eq!(
            config.policy.requester_allowlist,
            Some(vec!["a@x.com".to_string(), "b@x.com".to_string()])
        );
    }

    #[test]
    fn test_rejects_bad_max_artifact_mb() {
        for bad in ["0", "-3", "five"] {
            let result =
                SolverConfig::from_env_map(&env(&[("POLICY_MAX_ARTIFACT_MB", bad)]));
            assert!(result.is_err(), "should reject {bad}");
        }
    }

    #[test]
    fn test_unknown_env_keys_ignored() {
        let config =
            SolverConfig::from_env_map(&env(&[("TOTALLY_UNRELATED", "x")])).unwrap();
        config.check().unwrap();
    }

    #[test]
    fn test_intent_id_mode_parsing() {
        let strict =
            SolverConfig::from_env_map(&env(&[("INTENT_ID_MODE", "strict")])).unwrap();
        assert_eq!(strict.intent_id_mode, IntentIdMode::Strict);
        assert!(SolverConfig::from_env_map(&env(&[("INTENT_ID_MODE", "loose")])).is_err());
    }

    #[test]
    fn test_file_overrides_env() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("solver.toml");
        std::fs::write(
            &file,
            r#"
fsync = false
intent_id_mode = "strict"

[policy]
max_artifact_mb = 16
"#,
        )
        .unwrap();

        let mut config = SolverConfig::from_env_map(&env(&[
            ("POLICY_MAX_ARTIFACT_MB", "5"),
            ("FSYNC", "true"),
        ]))
        .unwrap();
        config.merge_file(&file).unwrap();

        assert!(!config.fsync);
        assert_eq!(config.intent_id_mode, IntentIdMode::Strict);
        assert_eq!(config.policy.max_artifact_mb, 16);
        // Untouched by the file.
        assert_eq!(config.policy.jobtype_allowlist, vec!["SAFE_REPORT"]);
    }

    #[test]
    fn test_file_data_dir_rederives_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("solver.toml");
        std::fs::write(&file, "data_dir = \"/elsewhere\"\n").unwrap();

        let mut config = SolverConfig::from_env_map(&env(&[("DATA_DIR", "/original")])).unwrap();
        config.merge_file(&file).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/elsewhere"));
        assert_eq!(
            config.receipts_path,
            PathBuf::from("/elsewhere/receipts.jsonl")
        );
    }

    #[test]
    fn test_malformed_file_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("solver.toml");
        std::fs::write(&file, "not toml [").unwrap();
        let mut config = SolverConfig::default();
        assert!(matches!(
            config.merge_file(&file),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_solver_info_carries_crate_identity() {
        let mut config = SolverConfig::default();
        config.git_commit = Some("abc123".to_string());
        let info = config.solver_info();
        assert_eq!(info.service, "solver-core");
        assert_eq!(info.git_commit.as_deref(), Some("abc123"));
    }
}
