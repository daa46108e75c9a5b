//! Canonical JSON encoding for deterministic hashing.
//!
//! Every byte sequence that is hashed anywhere in the pipeline is produced by
//! this module. The profile is a strict subset of JSON:
//!
//! - Object keys are sorted by Unicode code point at every nesting level.
//! - Arrays preserve input order; elements are canonicalized recursively.
//! - No insignificant whitespace, no BOM, no trailing newline.
//! - Numbers must be integers within the signed 64-bit range. Floats are
//!   rejected: producers encode fractional quantities as integers or strings.
//! - Strings use minimal escaping per RFC 8785 section 3.2.2.2.
//! - Duplicate object keys are rejected at parse time.
//! - Nesting deeper than [`MAX_DEPTH`] levels is rejected.
//!
//! Rejection happens at the producer, before any hasher sees the value, so a
//! float or duplicate key surfaces as an [`EncodingError`] and never as a
//! divergent digest.
//!
//! # Example
//!
//! ```
//! use solver_core::canonical::canonicalize_json;
//!
//! let canonical = canonicalize_json(r#"{"z": 1, "a": 2}"#).unwrap();
//! assert_eq!(canonical, r#"{"a":2,"z":1}"#);
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Maximum recursion depth accepted by the codec.
pub const MAX_DEPTH: usize = 128;

/// Errors raised while validating or emitting canonical JSON.
///
/// An `EncodingError` is always a producer-side bug: callers are expected to
/// hand the codec integer-only, duplicate-free JSON values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodingError {
    /// A floating-point number reached a hashed region.
    #[error("float not allowed in canonical JSON: encode fractional values as integers or strings")]
    FloatNotAllowed,

    /// A number is outside the signed 64-bit integer range.
    #[error("number out of range: {value} is outside the signed 64-bit integer range")]
    NumberOutOfRange {
        /// String rendering of the offending number.
        value: String,
    },

    /// An object contains the same key twice.
    #[error("duplicate key: '{key}' appears multiple times in object")]
    DuplicateKey {
        /// The duplicated key, after escape decoding.
        key: String,
    },

    /// The value is nested deeper than [`MAX_DEPTH`] levels.
    #[error("max depth exceeded: value nested deeper than {max_depth} levels")]
    MaxDepthExceeded {
        /// The depth limit that was exceeded.
        max_depth: usize,
    },

    /// The input is not well-formed JSON.
    #[error("JSON parse error: {message}")]
    ParseError {
        /// Description of the parse failure.
        message: String,
    },
}

/// Canonicalizes a JSON text.
///
/// Parses with duplicate-key detection, validates the integer-only profile,
/// and emits canonical bytes.
///
/// # Errors
///
/// Returns [`EncodingError`] if the input is not well-formed or violates the
/// canonical profile.
pub fn canonicalize_json(input: &str) -> Result<String, EncodingError> {
    let value = parse_canonical(input)?;
    to_canonical_string(&value)
}

/// Parses a JSON text, rejecting duplicate object keys.
///
/// The returned value still has to pass profile validation before emission;
/// use [`canonicalize_json`] when only the canonical bytes are needed.
///
/// # Errors
///
/// Returns [`EncodingError::ParseError`] on malformed input and
/// [`EncodingError::DuplicateKey`] when an object repeats a key.
pub fn parse_canonical(input: &str) -> Result<Value, EncodingError> {
    let mut deserializer = serde_json::Deserializer::from_str(input);
    let value = DuplicateCheckedValue::deserialize(&mut deserializer).map_err(|e| {
        let msg = e.to_string();
        if let Some(rest) = msg.strip_prefix("duplicate key: ") {
            // serde_json appends " at line X column Y"; strip it.
            let key = rest.split(" at line ").next().unwrap_or(rest).to_string();
            EncodingError::DuplicateKey { key }
        } else {
            EncodingError::ParseError { message: msg }
        }
    })?;
    Ok(value.0)
}

/// Emits the canonical byte string for an in-memory JSON value.
///
/// This is the single entry point to hashed bytes: identifier derivation,
/// manifest digests, and artifact payloads all flow through here.
///
/// # Errors
///
/// Returns [`EncodingError`] if the value contains floats, out-of-range
/// numbers, or exceeds the depth limit.
pub fn to_canonical_string(value: &Value) -> Result<String, EncodingError> {
    validate_value(value, 0)?;
    let mut output = String::new();
    emit_value(value, &mut output);
    Ok(output)
}

/// Emits the canonical bytes for a value.
///
/// Convenience wrapper over [`to_canonical_string`] for hashing call sites.
///
/// # Errors
///
/// Same as [`to_canonical_string`].
pub fn to_canonical_bytes(value: &Value) -> Result<Vec<u8>, EncodingError> {
    to_canonical_string(value).map(String::into_bytes)
}

/// Returns true when the input is already in canonical form.
#[must_use]
pub fn is_canonical(input: &str) -> bool {
    canonicalize_json(input).is_ok_and(|canonical| canonical == input)
}

/// Wrapper that rejects duplicate object keys during deserialization.
///
/// Standard parsers silently let the last duplicate win. Duplicates are
/// detected on the decoded key, so `"a"` and `"a"` collide.
struct DuplicateCheckedValue(Value);

impl<'de> Deserialize<'de> for DuplicateCheckedValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("any valid JSON value")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Value::Number(v.into()))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Value::Number(v.into()))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                // Floats are preserved here and rejected by profile
                // validation, so the error names the producer call site.
                Number::from_f64(v)
                    .map(Value::Number)
                    .ok_or_else(|| de::Error::custom("invalid float value"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(Value::String(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
                Ok(Value::String(v))
            }

            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(Value::Null)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(Value::Null)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut vec = Vec::new();
                while let Some(elem) = seq.next_element::<DuplicateCheckedValue>()? {
                    vec.push(elem.0);
                }
                Ok(Value::Array(vec))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen = BTreeSet::new();
                let mut obj = Map::new();
                while let Some(key) = map.next_key::<String>()? {
                    if !seen.insert(key.clone()) {
                        return Err(de::Error::custom(format!("duplicate key: {key}")));
                    }
                    let value = map.next_value::<DuplicateCheckedValue>()?;
                    obj.insert(key, value.0);
                }
                Ok(Value::Object(obj))
            }
        }

        deserializer
            .deserialize_any(ValueVisitor)
            .map(DuplicateCheckedValue)
    }
}

/// Recursively validates a value against the canonical profile.
fn validate_value(value: &Value, depth: usize) -> Result<(), EncodingError> {
    if depth > MAX_DEPTH {
        return Err(EncodingError::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }

    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => validate_number(n),
        Value::Array(arr) => {
            for item in arr {
                validate_value(item, depth + 1)?;
            }
            Ok(())
        },
        Value::Object(obj) => {
            for val in obj.values() {
                validate_value(val, depth + 1)?;
            }
            Ok(())
        },
    }
}

/// Validates that a number is an integer within i64 range.
fn validate_number(n: &Number) -> Result<(), EncodingError> {
    if n.is_i64() {
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        if u > i64::MAX as u64 {
            return Err(EncodingError::NumberOutOfRange {
                value: u.to_string(),
            });
        }
        return Ok(());
    }
    Err(EncodingError::FloatNotAllowed)
}

fn emit_value(value: &Value, output: &mut String) {
    match value {
        Value::Null => output.push_str("null"),
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, output),
        Value::String(s) => emit_string(s, output),
        Value::Array(arr) => emit_array(arr, output),
        Value::Object(obj) => emit_object(obj, output),
    }
}

fn emit_number(n: &Number, output: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(output, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(output, "{u}");
    } else {
        // Unreachable after validation.
        output.push_str(&n.to_string());
    }
}

/// Emits a string with minimal escaping per RFC 8785 section 3.2.2.2.
///
/// Only `"` and `\` and the control range U+0000..=U+001F are escaped; the
/// short escapes are used where JSON defines them.
fn emit_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{0008}' => output.push_str("\\b"),
            '\u{000C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(output, "\\u{:04x}", c as u32);
            },
            c => output.push(c),
        }
    }
    output.push('"');
}

fn emit_array(arr: &[Value], output: &mut String) {
    output.push('[');
    for (i, item) in arr.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        emit_value(item, output);
    }
    output.push(']');
}

fn emit_object(obj: &Map<String, Value>, output: &mut String) {
    let mut sorted_keys: Vec<&String> = obj.keys().collect();
    sorted_keys.sort();

    output.push('{');
    for (i, key) in sorted_keys.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        emit_string(key, output);
        output.push(':');
        emit_value(&obj[*key], output);
    }
    output.push('}');
}
