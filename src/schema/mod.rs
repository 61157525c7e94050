//! Input validation and output projection for one resource.

pub mod rules;

pub use rules::RuleSchema;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// A validated, storage-ready field map.
pub type Payload = serde_json::Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    /// Full document: required fields must be present.
    Create,
    /// Partial document: only the supplied fields are checked.
    Update,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldViolation {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("{}", summarize(.0))]
    Invalid(Vec<FieldViolation>),
}

fn summarize(violations: &[FieldViolation]) -> String {
    match violations {
        [] => "invalid input".to_string(),
        [one] => format!("{} {}", one.field, one.message),
        [first, rest @ ..] => format!("{} {} (and {} more)", first.field, first.message, rest.len()),
    }
}

impl SchemaError {
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            SchemaError::NotAnObject => &[],
            SchemaError::Invalid(v) => v,
        }
    }

    pub fn details(&self) -> Value {
        match self {
            SchemaError::NotAnObject => json!({ "expected": "object" }),
            SchemaError::Invalid(v) => json!({ "violations": v }),
        }
    }
}

/// Validation and projection capability bound to one resource.
pub trait Schema: Send + Sync {
    /// Check a raw request body and return the payload to hand to the repository.
    fn validate_input(&self, raw: Value, mode: ValidationMode) -> Result<Payload, SchemaError>;

    /// Shape a stored entity for output.
    fn project(&self, entity: Value) -> Value;
}
