//! Intent schema, normalization, and identifier verification.
//!
//! An intent is an immutable request. The validator consumes arbitrary
//! decoded JSON and produces a [`NormalizedIntent`] (with `intentId`
//! guaranteed present) or an ordered list of field errors. Validation never
//! throws away context: every failing field is reported with its path.
//!
//! Two checks deliberately do NOT live here:
//!
//! - Expiry. `expiresAt <= createdAt` passes validation; the policy gate
//!   owns that decision.
//! - Job-type membership. The tag must be a non-empty string, but an
//!   unregistered tag still normalizes, so the policy gate can refuse it
//!   with a recorded reason instead of a bare schema error. Input-shape
//!   validation applies to the registered tags only; unregistered tags
//!   carry their inputs opaquely.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::canonical::EncodingError;
use crate::ids;

/// The exact intent schema version this solver accepts.
pub const INTENT_VERSION: &str = "0.1.0";

/// Job types with a registered runner and a validated input shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobType {
    /// The reference report job.
    SafeReport,
}

impl JobType {
    /// Wire name of the job type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SafeReport => "SAFE_REPORT",
        }
    }

    /// Parses a wire name, `None` for tags without a registered shape.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SAFE_REPORT" => Some(Self::SafeReport),
            _ => None,
        }
    }
}

impl Serialize for JobType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of the reference `SAFE_REPORT` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeReportInputs {
    /// Non-empty report subject.
    pub subject: String,
    /// Arbitrary JSON mapping reported on.
    pub data: Map<String, Value>,
}

/// Job inputs, discriminated by the sibling `jobType` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum JobInputs {
    /// Validated inputs for [`JobType::SafeReport`].
    SafeReport(SafeReportInputs),
    /// Unvalidated inputs of a job type with no registered shape. Such an
    /// intent can be refused and recorded, but never executed.
    Opaque(Value),
}

impl JobInputs {
    /// Rebuilds the JSON value these inputs were decoded from.
    ///
    /// Identifier derivation hashes this value, so the mapping shape must
    /// match the wire form exactly.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::SafeReport(inputs) => {
                let mut obj = Map::new();
                obj.insert("subject".to_string(), Value::String(inputs.subject.clone()));
                obj.insert("data".to_string(), Value::Object(inputs.data.clone()));
                Value::Object(obj)
            },
            Self::Opaque(value) => value.clone(),
        }
    }
}

/// One acceptance criterion attached to an intent.
///
/// Criteria are carried through to operators verbatim; the core does not
/// evaluate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptanceCriterion {
    /// Criterion kind tag.
    #[serde(rename = "type")]
    pub criterion_type: String,
    /// Optional human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional machine-checkable value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// How a caller-provided `intentId` is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentIdMode {
    /// Recompute and reject on mismatch.
    Strict,
    /// Accept the provided value and log a warning on mismatch.
    #[default]
    Lenient,
}

/// An intent with `intentId` guaranteed present and verified per the
/// configured mode.
///
/// Produced once from decoded JSON; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIntent {
    /// Schema version literal.
    pub intent_version: String,
    /// Canonical intent identifier, 64-char lowercase hex.
    pub intent_id: String,
    /// Opaque requester identity.
    pub requester: String,
    /// Client-asserted creation time. Informational; excluded from ids.
    pub created_at: DateTime<Utc>,
    /// Optional expiry. Judged by the policy gate, not the validator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Job type tag as received on the wire.
    pub job_type: String,
    /// Tagged job inputs.
    pub inputs: JobInputs,
    /// Optional execution constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Map<String, Value>>,
    /// Optional ordered acceptance criteria.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<Vec<AcceptanceCriterion>>,
    /// Optional free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl NormalizedIntent {
    /// The JSON value of the inputs, as hashed by identifier derivation.
    #[must_use]
    pub fn inputs_value(&self) -> Value {
        self.inputs.to_value()
    }

    /// The constraints as a JSON value, `{}` when absent.
    #[must_use]
    pub fn constraints_value(&self) -> Value {
        self.constraints
            .clone()
            .map_or_else(|| Value::Object(Map::new()), Value::Object)
    }
}

/// A single field-level validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// JSON path of the offending field (empty for the document root).
    pub path: String,
    /// What went wrong.
    pub message: String,
}

/// Validation failure carrying every field error found.
#[derive(Debug, Clone, Error)]
#[error("intent validation failed with {} error(s)", errors.len())]
pub struct ValidationFailure {
    /// Ordered field errors.
    pub errors: Vec<FieldError>,
}

/// Top-level fields the schema knows about. Anything else is rejected.
const KNOWN_FIELDS: &[&str] = &[
    "intentVersion",
    "intentId",
    "requester",
    "createdAt",
    "expiresAt",
    "jobType",
    "inputs",
    "constraints",
    "acceptanceCriteria",
    "meta",
];

/// Validates decoded JSON and produces a [`NormalizedIntent`].
///
/// All schema violations are collected before returning; the error carries
/// the full ordered list.
///
/// # Errors
///
/// Returns [`ValidationFailure`] when any field fails schema validation, the
/// inputs violate the canonical profile, or (in strict mode) a provided
/// `intentId` does not match the computed one.
pub fn validate_intent(
    raw: &Value,
    mode: IntentIdMode,
) -> Result<NormalizedIntent, ValidationFailure> {
    let mut errors = Vec::new();

    let Some(obj) = raw.as_object() else {
        return Err(ValidationFailure {
            errors: vec![FieldError {
                path: String::new(),
                message: "intent must be a JSON object".to_string(),
            }],
        });
    };

    for key in obj.keys() {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            errors.push(FieldError {
                path: key.clone(),
                message: format!("unknown field '{key}'"),
            });
        }
    }

    let intent_version = match obj.get("intentVersion").and_then(Value::as_str) {
        Some(v) if v == INTENT_VERSION => Some(v.to_string()),
        Some(v) => {
            errors.push(FieldError {
                path: "intentVersion".to_string(),
                message: format!("unsupported intentVersion '{v}', expected '{INTENT_VERSION}'"),
            });
            None
        },
        None => {
            errors.push(FieldError {
                path: "intentVersion".to_string(),
                message: "missing or non-string intentVersion".to_string(),
            });
            None
        },
    };

    let requester = match obj.get("requester").and_then(Value::as_str) {
        Some(r) if !r.is_empty() => Some(r.to_string()),
        Some(_) => {
            errors.push(FieldError {
                path: "requester".to_string(),
                message: "requester must be non-empty".to_string(),
            });
            None
        },
        None => {
            errors.push(FieldError {
                path: "requester".to_string(),
                message: "missing or non-string requester".to_string(),
            });
            None
        },
    };

    let created_at = parse_timestamp(obj, "createdAt", true, &mut errors);
    let expires_at = parse_timestamp(obj, "expiresAt", false, &mut errors);

    let job_type = match obj.get("jobType").and_then(Value::as_str) {
        Some(tag) if !tag.is_empty() => Some(tag.to_string()),
        Some(_) => {
            errors.push(FieldError {
                path: "jobType".to_string(),
                message: "jobType must be non-empty".to_string(),
            });
            None
        },
        None => {
            errors.push(FieldError {
                path: "jobType".to_string(),
                message: "missing or non-string jobType".to_string(),
            });
            None
        },
    };

    let inputs = job_type
        .as_deref()
        .and_then(|tag| validate_inputs(tag, obj.get("inputs"), &mut errors));

    let constraints = match obj.get("constraints") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => {
            errors.push(FieldError {
                path: "constraints".to_string(),
                message: "constraints must be an object".to_string(),
            });
            None
        },
    };

    let acceptance_criteria =
        validate_acceptance_criteria(obj.get("acceptanceCriteria"), &mut errors);

    let meta = match obj.get("meta") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => {
            errors.push(FieldError {
                path: "meta".to_string(),
                message: "meta must be an object".to_string(),
            });
            None
        },
    };

    if !errors.is_empty() {
        return Err(ValidationFailure { errors });
    }

    // All fields individually valid from here on; the unwraps below cannot
    // trigger because every None pushed an error.
    let intent_version = intent_version.unwrap_or_default();
    let requester = requester.unwrap_or_default();
    let job_type = job_type.unwrap_or_default();
    let inputs = inputs.unwrap_or(JobInputs::Opaque(Value::Null));
    let created_at = created_at.unwrap_or_default();

    let computed_id = match ids::intent_id(
        &intent_version,
        &requester,
        &job_type,
        &inputs.to_value(),
        constraints.clone().map(Value::Object).as_ref(),
    ) {
        Ok(id) => id,
        Err(e) => {
            return Err(ValidationFailure {
                errors: vec![encoding_error_to_field_error(&e)],
            });
        },
    };

    let intent_id = match obj.get("intentId").and_then(Value::as_str) {
        None => computed_id,
        Some(provided) if provided == computed_id => computed_id,
        Some(provided) => match mode {
            IntentIdMode::Strict => {
                return Err(ValidationFailure {
                    errors: vec![FieldError {
                        path: "intentId".to_string(),
                        message: format!(
                            "provided intentId does not match computed value {computed_id}"
                        ),
                    }],
                });
            },
            IntentIdMode::Lenient => {
                warn!(
                    provided = provided,
                    computed = %computed_id,
                    "accepting caller-provided intentId that does not match the canonical formula"
                );
                provided.to_string()
            },
        },
    };

    Ok(NormalizedIntent {
        intent_version,
        intent_id,
        requester,
        created_at,
        expires_at,
        job_type,
        inputs,
        constraints,
        acceptance_criteria,
        meta,
    })
}

fn parse_timestamp(
    obj: &Map<String, Value>,
    field: &str,
    required: bool,
    errors: &mut Vec<FieldError>,
) -> Option<DateTime<Utc>> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            if required {
                errors.push(FieldError {
                    path: field.to_string(),
                    message: format!("missing {field}"),
                });
            }
            None
        },
        Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                errors.push(FieldError {
                    path: field.to_string(),
                    message: format!("invalid RFC 3339 timestamp: {e}"),
                });
                None
            },
        },
        Some(_) => {
            errors.push(FieldError {
                path: field.to_string(),
                message: format!("{field} must be an RFC 3339 string"),
            });
            None
        },
    }
}

fn validate_inputs(
    job_tag: &str,
    inputs: Option<&Value>,
    errors: &mut Vec<FieldError>,
) -> Option<JobInputs> {
    let Some(value) = inputs else {
        errors.push(FieldError {
            path: "inputs".to_string(),
            message: "missing inputs".to_string(),
        });
        return None;
    };

    match JobType::parse(job_tag) {
        Some(JobType::SafeReport) => {
            let Some(map) = value.as_object() else {
                errors.push(FieldError {
                    path: "inputs".to_string(),
                    message: "inputs must be an object".to_string(),
                });
                return None;
            };
            validate_safe_report_inputs(map, errors)
        },
        // No registered shape for this tag; the policy gate decides whether
        // a refusal is recorded.
        None => Some(JobInputs::Opaque(value.clone())),
    }
}

fn validate_safe_report_inputs(
    map: &Map<String, Value>,
    errors: &mut Vec<FieldError>,
) -> Option<JobInputs> {
    let mut ok = true;

    for key in map.keys() {
        if key != "subject" && key != "data" {
            errors.push(FieldError {
                path: format!("inputs.{key}"),
                message: format!("unknown field '{key}' for jobType SAFE_REPORT"),
            });
            ok = false;
        }
    }

    let subject = match map.get("subject").and_then(Value::as_str) {
        Some(s) if !s.is_empty() => s.to_string(),
        Some(_) => {
            errors.push(FieldError {
                path: "inputs.subject".to_string(),
                message: "subject must be non-empty".to_string(),
            });
            ok = false;
            String::new()
        },
        None => {
            errors.push(FieldError {
                path: "inputs.subject".to_string(),
                message: "missing or non-string subject".to_string(),
            });
            ok = false;
            String::new()
        },
    };

    let data = match map.get("data") {
        Some(Value::Object(data)) => data.clone(),
        _ => {
            errors.push(FieldError {
                path: "inputs.data".to_string(),
                message: "missing or non-object data".to_string(),
            });
            ok = false;
            Map::new()
        },
    };

    ok.then_some(JobInputs::SafeReport(SafeReportInputs { subject, data }))
}

fn validate_acceptance_criteria(
    value: Option<&Value>,
    errors: &mut Vec<FieldError>,
) -> Option<Vec<AcceptanceCriterion>> {
    let arr = match value {
        None | Some(Value::Null) => return None,
        Some(Value::Array(arr)) => arr,
        Some(_) => {
            errors.push(FieldError {
                path: "acceptanceCriteria".to_string(),
                message: "acceptanceCriteria must be an array".to_string(),
            });
            return None;
        },
    };

    let mut criteria = Vec::with_capacity(arr.len());
    for (i, item) in arr.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            errors.push(FieldError {
                path: format!("acceptanceCriteria[{i}]"),
                message: "criterion must be an object".to_string(),
            });
            continue;
        };
        let Some(criterion_type) = obj.get("type").and_then(Value::as_str) else {
            errors.push(FieldError {
                path: format!("acceptanceCriteria[{i}].type"),
                message: "missing or non-string type".to_string(),
            });
            continue;
        };
        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .map(String::from);
        criteria.push(AcceptanceCriterion {
            criterion_type: criterion_type.to_string(),
            description,
            value: obj.get("value").cloned(),
        });
    }
    Some(criteria)
}

fn encoding_error_to_field_error(e: &EncodingError) -> FieldError {
    FieldError {
        path: "inputs".to_string(),
        message: format!("inputs are not canonically encodable: {e}"),
    }
}
