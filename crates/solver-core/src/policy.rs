//! Policy gate deciding whether a normalized intent may execute.
//!
//! Unlike a first-match rule engine, this gate runs **every** configured
//! check and collects all failing reasons, in a fixed order, so a requester
//! learns everything wrong with an intent from a single refusal record. A
//! refusal is a first-class outcome, not an error.
//!
//! Check order (stable across releases, so refusal records diff cleanly):
//!
//! 1. `jobType_allowlist`
//! 2. `expiry`
//! 3. `requester_allowlist`
//! 4. `inputs_size`

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::{to_canonical_string, EncodingError};
use crate::clock::Clock;
use crate::intent::NormalizedIntent;

/// Configured policy checks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PolicyConfig {
    /// Job types allowed to execute.
    pub jobtype_allowlist: Vec<String>,
    /// Upper bound on `|canonical(inputs)|`, in mebibytes.
    pub max_artifact_mb: u64,
    /// Optional requester allowlist. Absent means every requester passes.
    pub requester_allowlist: Option<Vec<String>>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            jobtype_allowlist: vec!["SAFE_REPORT".to_string()],
            max_artifact_mb: 5,
            requester_allowlist: None,
        }
    }
}

/// The ordered outcome of the policy gate.
///
/// `reasons` is empty exactly when `allowed` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Whether the intent may proceed to execution.
    pub allowed: bool,
    /// Every failing check's reason, in the fixed check order.
    pub reasons: Vec<String>,
}

impl PolicyDecision {
    /// An allow decision with no reasons.
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reasons: Vec::new(),
        }
    }
}

/// One line of the append-only refusal log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefusalRecord {
    /// When the refusal was recorded (injected clock).
    pub timestamp: DateTime<Utc>,
    /// Intent identifier.
    pub intent_id: String,
    /// Run identifier the refusal was computed under.
    pub run_id: String,
    /// Job type tag of the refused intent.
    pub job_type: String,
    /// Requester identity.
    pub requester: String,
    /// All failing reasons, in check order.
    pub reasons: Vec<String>,
    /// Schema version of the refused intent.
    pub intent_version: String,
}

/// Evaluates every configured check against a normalized intent.
///
/// Checks never short-circuit: an intent failing several checks yields a
/// decision listing each reason.
///
/// # Errors
///
/// Returns [`EncodingError`] only if the inputs cannot be canonically
/// encoded, which validation has already ruled out for intents produced by
/// [`crate::intent::validate_intent`].
pub fn evaluate(
    intent: &NormalizedIntent,
    config: &PolicyConfig,
    clock: &dyn Clock,
) -> Result<PolicyDecision, EncodingError> {
    let mut reasons = Vec::new();

    if !config
        .jobtype_allowlist
        .iter()
        .any(|allowed| allowed == &intent.job_type)
    {
        reasons.push(format!(
            "jobType '{}' not in allowlist [{}]",
            intent.job_type,
            config.jobtype_allowlist.join(", ")
        ));
    }

    if let Some(expires_at) = intent.expires_at {
        if expires_at < clock.now_utc() {
            reasons.push(format!(
                "intent expired at {}",
                expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
    }

    if let Some(allowlist) = &config.requester_allowlist {
        if !allowlist.iter().any(|allowed| allowed == &intent.requester) {
            reasons.push(format!("requester '{}' not in allowlist", intent.requester));
        }
    }

    let canonical_inputs = to_canonical_string(&intent.inputs_value())?;
    let size = canonical_inputs.len() as u64;
    let max = config.max_artifact_mb * (1 << 20);
    if size > max {
        reasons.push(format!(
            "inputs size {size} bytes exceeds max {max} bytes ({} MB)",
            config.max_artifact_mb
        ));
    }

    Ok(PolicyDecision {
        allowed: reasons.is_empty(),
        reasons,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::clock::FixedClock;
    use crate::intent::{validate_intent, IntentIdMode};

    fn intent_from(raw: Value) -> NormalizedIntent {
        validate_intent(&raw, IntentIdMode::Lenient).unwrap()
    }

    fn sample_intent() -> NormalizedIntent {
        intent_from(serde_json::json!({
            "intentVersion": "0.1.0",
            "requester": "test@example.com",
            "createdAt": "2026-01-01T00:00:00Z",
            "jobType": "SAFE_REPORT",
            "inputs": {"subject": "Hi", "data": {"k": "v"}},
        }))
    }

    fn clock() -> FixedClock {
        // 2026-01-15T00:00:00Z
        FixedClock::from_unix(1_768_435_200)
    }

    #[test]
    fn test_allows_conforming_intent() {
        let decision = evaluate(&sample_intent(), &PolicyConfig::default(), &clock()).unwrap();
        assert!(decision.allowed);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn test_refuses_job_type_outside_allowlist() {
        let mut intent = sample_intent();
        intent.job_type = "UNKNOWN".to_string();
        let decision = evaluate(&intent, &PolicyConfig::default(), &clock()).unwrap();
        assert!(!decision.allowed);
        assert_eq!(
            decision.reasons,
            vec!["jobType 'UNKNOWN' not in allowlist [SAFE_REPORT]"]
        );
    }

    #[test]
    fn test_refuses_expired_intent() {
        let intent = intent_from(serde_json::json!({
            "intentVersion": "0.1.0",
            "requester": "test@example.com",
            "createdAt": "2019-01-01T00:00:00Z",
            "expiresAt": "2020-01-01T00:00:00Z",
            "jobType": "SAFE_REPORT",
            "inputs": {"subject": "Hi", "data": {}},
        }));
        let decision = evaluate(&intent, &PolicyConfig::default(), &clock()).unwrap();
        assert_eq!(
            decision.reasons,
            vec!["intent expired at 2020-01-01T00:00:00Z"]
        );
    }

    #[test]
    fn test_future_expiry_passes() {
        let intent = intent_from(serde_json::json!({
            "intentVersion": "0.1.0",
            "requester": "test@example.com",
            "createdAt": "2026-01-01T00:00:00Z",
            "expiresAt": "2999-01-01T00:00:00Z",
            "jobType": "SAFE_REPORT",
            "inputs": {"subject": "Hi", "data": {}},
        }));
        assert!(evaluate(&intent, &PolicyConfig::default(), &clock())
            .unwrap()
            .allowed);
    }

    #[test]
    fn test_requester_allowlist_enforced_only_when_configured() {
        let intent = sample_intent();

        let open = PolicyConfig::default();
        assert!(evaluate(&intent, &open, &clock()).unwrap().allowed);

        let closed = PolicyConfig {
            requester_allowlist: Some(vec!["ops@example.com".to_string()]),
            ..PolicyConfig::default()
        };
        let decision = evaluate(&intent, &closed, &clock()).unwrap();
        assert_eq!(
            decision.reasons,
            vec!["requester 'test@example.com' not in allowlist"]
        );
    }

    #[test]
    fn test_inputs_size_boundary() {
        // Cap of 0 MB means any non-empty canonical inputs exceed it; use a
        // 1 MB cap and straddle the boundary instead.
        let config = PolicyConfig {
            max_artifact_mb: 1,
            ..PolicyConfig::default()
        };
        let cap = 1usize << 20;

        // canonical form: {"data":{"pad":"<fill>"},"subject":"Hi"}
        let overhead =
            to_canonical_string(&serde_json::json!({"subject": "Hi", "data": {"pad": ""}}))
                .unwrap()
                .len();

        let at_cap = "x".repeat(cap - overhead);
        let intent = intent_from(serde_json::json!({
            "intentVersion": "0.1.0",
            "requester": "test@example.com",
            "createdAt": "2026-01-01T00:00:00Z",
            "jobType": "SAFE_REPORT",
            "inputs": {"subject": "Hi", "data": {"pad": at_cap}},
        }));
        assert!(evaluate(&intent, &config, &clock()).unwrap().allowed);

        let over_cap = "x".repeat(cap - overhead + 1);
        let intent = intent_from(serde_json::json!({
            "intentVersion": "0.1.0",
            "requester": "test@example.com",
            "createdAt": "2026-01-01T00:00:00Z",
            "jobType": "SAFE_REPORT",
            "inputs": {"subject": "Hi", "data": {"pad": over_cap}},
        }));
        let decision = evaluate(&intent, &config, &clock()).unwrap();
        assert_eq!(
            decision.reasons,
            vec![format!(
                "inputs size {} bytes exceeds max {} bytes (1 MB)",
                cap + 1,
                cap
            )]
        );
    }

    #[test]
    fn test_all_reasons_collected_in_fixed_order() {
        // Fails jobType, expiry, and requester checks at once.
        let intent = intent_from(serde_json::json!({
            "intentVersion": "0.1.0",
            "requester": "stranger@example.com",
            "createdAt": "2019-01-01T00:00:00Z",
            "expiresAt": "2020-01-01T00:00:00Z",
            "jobType": "UNKNOWN",
            "inputs": {"anything": true},
        }));
        let config = PolicyConfig {
            requester_allowlist: Some(vec!["ops@example.com".to_string()]),
            ..PolicyConfig::default()
        };
        let decision = evaluate(&intent, &config, &clock()).unwrap();
        assert!(!decision.allowed);
        assert_eq!(
            decision.reasons,
            vec![
                "jobType 'UNKNOWN' not in allowlist [SAFE_REPORT]".to_string(),
                "intent expired at 2020-01-01T00:00:00Z".to_string(),
                "requester 'stranger@example.com' not in allowlist".to_string(),
            ]
        );
    }

    #[test]
    fn test_refusal_record_round_trips_as_json_line() {
        let record = RefusalRecord {
            timestamp: clock().now_utc(),
            intent_id: "a".repeat(64),
            run_id: "b".repeat(64),
            job_type: "UNKNOWN".to_string(),
            requester: "test@example.com".to_string(),
            reasons: vec!["jobType 'UNKNOWN' not in allowlist [SAFE_REPORT]".to_string()],
            intent_version: "0.1.0".to_string(),
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"intentId\""));
        let back: RefusalRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
    }
}
