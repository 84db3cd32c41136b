//! Structured response schemas for entailment output.
//!
//! The completion service is asked for output conforming to these schemas,
//! but its answer is untrusted text. Every response is parsed and validated
//! here before a label is accepted.
//!
//! The canonical batch shape is `{"claims": [{"label", "confidence"}, ...]}`
//! for both full and chunked batches. A bare top-level array of the same
//! items is accepted as an equivalent encoding.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use thiserror::Error;

use crate::parser::strip_code_fence;
use crate::types::{Entailment, EntailmentLabel};

/// Compiled validators (initialized once, reused).
static SINGLE_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static BATCH_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from decoding a structured entailment response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),

    #[error("Response is not valid JSON: {0}")]
    Malformed(String),

    #[error("Response does not match schema: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Expected {expected} results, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Schema for a single `{label, confidence}` judgement.
pub fn entailment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "label": { "type": "string", "enum": ["entailment", "contradiction", "neutral"] },
            "confidence": { "type": "number" }
        },
        "required": ["label", "confidence"],
        "additionalProperties": false
    })
}

/// Schema for a batch of judgements under `claims`.
pub fn batch_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "claims": {
                "type": "array",
                "items": entailment_schema()
            }
        },
        "required": ["claims"],
        "additionalProperties": false
    })
}

fn compile(schema: Value) -> Result<jsonschema::Validator, String> {
    jsonschema::options()
        .build(&schema)
        .map_err(|e| format!("Failed to compile schema: {}", e))
}

fn single_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    SINGLE_VALIDATOR
        .get_or_init(|| compile(entailment_schema()))
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

fn batch_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    BATCH_VALIDATOR
        .get_or_init(|| compile(batch_schema()))
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

fn validate(validator: &jsonschema::Validator, instance: &Value) -> Result<(), SchemaError> {
    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Invalid(errors))
    }
}

#[derive(Deserialize)]
struct RawEntailment {
    label: EntailmentLabel,
    confidence: f64,
}

impl From<RawEntailment> for Entailment {
    fn from(raw: RawEntailment) -> Self {
        Entailment::new(raw.label, raw.confidence)
    }
}

#[derive(Deserialize)]
struct RawBatch {
    claims: Vec<RawEntailment>,
}

fn parse_json(raw: &str) -> Result<Value, SchemaError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| SchemaError::Malformed(e.to_string()))
}

/// Decode a batch response, requiring exactly `expected` judgements.
pub fn decode_batch_response(raw: &str, expected: usize) -> Result<Vec<Entailment>, SchemaError> {
    let value = match parse_json(raw)? {
        Value::Array(items) => json!({ "claims": items }),
        other => other,
    };

    validate(batch_validator()?, &value)?;

    let batch: RawBatch =
        serde_json::from_value(value).map_err(|e| SchemaError::Malformed(e.to_string()))?;

    if batch.claims.len() != expected {
        return Err(SchemaError::LengthMismatch {
            expected,
            actual: batch.claims.len(),
        });
    }

    Ok(batch.claims.into_iter().map(Entailment::from).collect())
}

/// Decode a single `{label, confidence}` response.
pub fn decode_single_response(raw: &str) -> Result<Entailment, SchemaError> {
    let value = parse_json(raw)?;
    validate(single_validator()?, &value)?;

    let single: RawEntailment =
        serde_json::from_value(value).map_err(|e| SchemaError::Malformed(e.to_string()))?;
    Ok(single.into())
}
