//! Schema built from a resource's field types and config validation rules.

use crate::config::{FieldType, IdType, ModelDescriptor, ValidationRule};
use crate::error::ConfigError;
use crate::query::compiler::parse_date;
use crate::schema::{FieldViolation, Payload, Schema, SchemaError, ValidationMode};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct RuleSchema {
    model: Arc<ModelDescriptor>,
    patterns: HashMap<String, Regex>,
}

impl RuleSchema {
    /// Compiles the `pattern` rules up front so a bad pattern fails at startup.
    pub fn new(model: Arc<ModelDescriptor>) -> Result<Self, ConfigError> {
        let mut patterns = HashMap::new();
        for (field, rule) in &model.validation {
            if let Some(p) = &rule.pattern {
                let re = Regex::new(p).map_err(|e| {
                    ConfigError::Validation(format!("resource {}: invalid pattern for {}: {}", model.name, field, e))
                })?;
                patterns.insert(field.clone(), re);
            }
        }
        Ok(RuleSchema { model, patterns })
    }

    fn check_field(&self, name: &str, v: &Value, mode: ValidationMode, out: &mut Vec<FieldViolation>) {
        let model = &self.model;
        if name == model.id_field {
            match mode {
                ValidationMode::Update => out.push(FieldViolation::new(name, "cannot be changed")),
                ValidationMode::Create => {
                    if let Some(msg) = id_type_error(model.id_type, v) {
                        out.push(FieldViolation::new(name, msg));
                    }
                }
            }
            return;
        }
        let Some(field) = model.field(name) else {
            out.push(FieldViolation::new(name, "is not a known field"));
            return;
        };
        if model.is_read_only(name) {
            out.push(FieldViolation::new(name, "is read-only"));
            return;
        }
        if v.is_null() {
            return;
        }
        if let Some(msg) = type_error(field.field_type, v) {
            out.push(FieldViolation::new(name, msg));
            return;
        }
        if let Some(rule) = model.validation.get(name) {
            self.check_rule(name, v, rule, out);
        }
    }

    fn check_rule(&self, name: &str, v: &Value, rule: &ValidationRule, out: &mut Vec<FieldViolation>) {
        if let Some(format) = &rule.format {
            if let Some(msg) = format_error(v, format) {
                out.push(FieldViolation::new(name, msg));
            }
        }
        if let Some(s) = v.as_str() {
            let len = s.chars().count();
            if let Some(max) = rule.max_length {
                if len > max as usize {
                    out.push(FieldViolation::new(name, format!("must be at most {} characters", max)));
                }
            }
            if let Some(min) = rule.min_length {
                if len < min as usize {
                    out.push(FieldViolation::new(name, format!("must be at least {} characters", min)));
                }
            }
            if let Some(re) = self.patterns.get(name) {
                if !re.is_match(s) {
                    out.push(FieldViolation::new(name, "does not match required pattern"));
                }
            }
        }
        if let Some(allowed) = &rule.allowed {
            if !allowed.iter().any(|a| value_eq(v, a)) {
                out.push(FieldViolation::new(
                    name,
                    format!("must be one of: {:?}", allowed.iter().take(5).collect::<Vec<_>>()),
                ));
            }
        }
        if let Some(n) = v.as_f64() {
            if let Some(min) = rule.minimum {
                if n < min {
                    out.push(FieldViolation::new(name, format!("must be at least {}", min)));
                }
            }
            if let Some(max) = rule.maximum {
                if n > max {
                    out.push(FieldViolation::new(name, format!("must be at most {}", max)));
                }
            }
        }
    }
}

impl Schema for RuleSchema {
    fn validate_input(&self, raw: Value, mode: ValidationMode) -> Result<Payload, SchemaError> {
        let Value::Object(body) = raw else {
            return Err(SchemaError::NotAnObject);
        };
        let mut violations = Vec::new();
        for (name, v) in &body {
            self.check_field(name, v, mode, &mut violations);
        }
        // Required fields in declaration order. On update only an explicit null is rejected.
        for field in &self.model.fields {
            let required = self
                .model
                .validation
                .get(&field.name)
                .and_then(|r| r.required)
                .unwrap_or(false);
            if !required {
                continue;
            }
            let missing = match (mode, body.get(&field.name)) {
                (_, Some(Value::Null)) => true,
                (ValidationMode::Create, None) => true,
                _ => false,
            };
            if missing {
                violations.push(FieldViolation::new(&field.name, "is required"));
            }
        }
        if violations.is_empty() {
            Ok(body)
        } else {
            Err(SchemaError::Invalid(violations))
        }
    }

    fn project(&self, entity: Value) -> Value {
        match entity {
            Value::Object(mut m) => {
                for f in &self.model.sensitive_fields {
                    m.remove(f);
                }
                Value::Object(m)
            }
            other => other,
        }
    }
}

fn type_error(t: FieldType, v: &Value) -> Option<&'static str> {
    let ok = match t {
        FieldType::String => v.is_string(),
        FieldType::Number => v.is_number(),
        FieldType::Boolean => v.is_boolean(),
        FieldType::Date => v.as_str().and_then(parse_date).is_some(),
        FieldType::Identifier | FieldType::Reference => v.is_string() || v.is_i64() || v.is_u64(),
    };
    if ok {
        None
    } else {
        Some(match t {
            FieldType::String => "must be a string",
            FieldType::Number => "must be a number",
            FieldType::Boolean => "must be a boolean",
            FieldType::Date => "must be an RFC 3339 date-time or YYYY-MM-DD date",
            FieldType::Identifier | FieldType::Reference => "must be a string or integer identifier",
        })
    }
}

fn id_type_error(t: IdType, v: &Value) -> Option<&'static str> {
    match t {
        IdType::Uuid => match v.as_str().map(uuid::Uuid::parse_str) {
            Some(Ok(_)) => None,
            _ => Some("must be a valid UUID"),
        },
        IdType::Int => (!v.is_i64()).then_some("must be an integer"),
        IdType::Text => match v.as_str() {
            Some(s) if !s.is_empty() => None,
            _ => Some("must be a non-empty string"),
        },
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn format_error(v: &Value, format: &str) -> Option<&'static str> {
    let s = v.as_str()?;
    match format.to_lowercase().as_str() {
        "email" if !s.contains('@') || s.len() < 3 => Some("must be a valid email"),
        "uuid" if uuid::Uuid::parse_str(s).is_err() => Some("must be a valid UUID"),
        "date" | "date-time" if parse_date(s).is_none() => Some("must be a valid date"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_document, resolve, PageSettings};
    use serde_json::json;

    fn schema() -> RuleSchema {
        let raw = r#"{
            "name": "users",
            "fields": [
                {"name": "email", "type": "string"},
                {"name": "name", "type": "string"},
                {"name": "age", "type": "number"},
                {"name": "role", "type": "string"},
                {"name": "password", "type": "string"},
                {"name": "createdAt", "type": "date"}
            ],
            "sensitive_fields": ["password"],
            "timestamps": {"created": "createdAt"},
            "validation": {
                "email": {"required": true, "format": "email"},
                "name": {"required": true, "max_length": 5},
                "age": {"minimum": 0},
                "role": {"allowed": ["admin", "member"]}
            }
        }"#;
        let model = resolve(&parse_document(raw).unwrap()[0], &PageSettings::default()).unwrap();
        RuleSchema::new(Arc::new(model)).unwrap()
    }

    #[test]
    fn create_accepts_valid_body() {
        let payload = schema()
            .validate_input(json!({"email": "a@b.io", "name": "Ann", "age": 30}), ValidationMode::Create)
            .unwrap();
        assert_eq!(payload.get("age"), Some(&json!(30)));
    }

    #[test]
    fn create_collects_every_violation() {
        let err = schema()
            .validate_input(
                json!({"name": "Annabel", "age": "old", "role": "root", "nickname": "x"}),
                ValidationMode::Create,
            )
            .unwrap_err();
        let fields: Vec<_> = err.violations().iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"age"));
        assert!(fields.contains(&"role"));
        assert!(fields.contains(&"nickname"));
        assert_eq!(err.details()["violations"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn update_is_partial_but_rejects_null_required() {
        let s = schema();
        s.validate_input(json!({"age": 31}), ValidationMode::Update).unwrap();
        let err = s.validate_input(json!({"email": null}), ValidationMode::Update).unwrap_err();
        assert_eq!(err.violations()[0].field, "email");
    }

    #[test]
    fn id_and_timestamps_are_guarded() {
        let s = schema();
        let err = s
            .validate_input(json!({"id": "x", "createdAt": "2024-01-01"}), ValidationMode::Update)
            .unwrap_err();
        let messages: Vec<_> = err.violations().iter().map(|v| v.message.as_str()).collect();
        assert!(messages.contains(&"cannot be changed"));
        assert!(messages.contains(&"is read-only"));

        let err = s
            .validate_input(json!({"id": "nope", "email": "a@b.io", "name": "Ann"}), ValidationMode::Create)
            .unwrap_err();
        assert_eq!(err.violations()[0].message, "must be a valid UUID");
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert_eq!(
            schema().validate_input(json!([1, 2]), ValidationMode::Create).unwrap_err(),
            SchemaError::NotAnObject
        );
    }

    #[test]
    fn project_strips_sensitive_fields() {
        let out = schema().project(json!({"id": "1", "email": "a@b.io", "password": "hash"}));
        assert_eq!(out, json!({"id": "1", "email": "a@b.io"}));
    }
}
