//! Config validation: field references, operations, page bounds and path uniqueness.

use crate::config::{FieldTypeConfig, Operation, ResourceConfig};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

/// Paths mounted by the common routes.
const RESERVED_PATH_SEGMENTS: [&str; 3] = ["health", "ready", "version"];

fn is_valid_path_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Column types are interpolated into SQL casts.
fn is_valid_column_type(s: &str) -> bool {
    !s.trim().is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '.' | ',' | '(' | ')' | '[' | ']'))
}

/// Field names appear in query keys and sort tokens, so they are restricted to `[A-Za-z0-9_]`.
fn is_valid_field_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a full set of resources: each one individually, then base path uniqueness.
pub fn validate(resources: &[ResourceConfig]) -> Result<(), ConfigError> {
    let mut path_segments = HashSet::new();
    for r in resources {
        validate_resource(r)?;
        if !path_segments.insert(r.path_segment()) {
            return Err(ConfigError::DuplicatePathSegment(r.path_segment().to_string()));
        }
    }
    Ok(())
}

pub fn validate_resource(r: &ResourceConfig) -> Result<(), ConfigError> {
    if r.name.trim().is_empty() {
        return Err(ConfigError::Validation("resource name must not be empty".into()));
    }
    if !is_valid_path_segment(r.path_segment()) {
        return Err(ConfigError::Validation(format!(
            "resource {}: invalid path segment '{}'",
            r.name,
            r.path_segment()
        )));
    }

    if RESERVED_PATH_SEGMENTS.contains(&r.path_segment()) {
        return Err(ConfigError::Validation(format!(
            "resource {}: path segment '{}' is reserved",
            r.name,
            r.path_segment()
        )));
    }

    let mut names = HashSet::new();
    for f in &r.fields {
        if !names.insert(f.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "resource {}: duplicate field '{}'",
                r.name, f.name
            )));
        }
        if !is_valid_field_name(&f.name) {
            return Err(ConfigError::Validation(format!(
                "resource {}: invalid field name '{}'",
                r.name, f.name
            )));
        }
        if let Some(t) = &f.column_type {
            if !is_valid_column_type(t) {
                return Err(ConfigError::Validation(format!(
                    "resource {}: invalid column type '{}' for field '{}'",
                    r.name, t, f.name
                )));
            }
        }
        if f.name.contains("__") {
            return Err(ConfigError::Validation(format!(
                "resource {}: field '{}' must not contain '__'",
                r.name, f.name
            )));
        }
    }
    if let Some(id) = r.fields.iter().find(|f| f.name == r.id_field) {
        if id.type_ != FieldTypeConfig::Identifier {
            return Err(ConfigError::InvalidPrimaryKey {
                resource: r.name.clone(),
                field: r.id_field.clone(),
            });
        }
    }
    names.insert(r.id_field.as_str());

    let known = |kind: &'static str, field: &str| -> Result<(), ConfigError> {
        if names.contains(field) {
            Ok(())
        } else {
            Err(ConfigError::MissingReference {
                kind,
                id: format!("{}.{}", r.name, field),
            })
        }
    };
    for f in &r.sensitive_fields {
        known("sensitive field", f)?;
    }
    for f in &r.unique {
        known("unique field", f)?;
    }
    for (f, rule) in &r.validation {
        known("validated field", f)?;
        if let Some(pattern) = &rule.pattern {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("resource {}: invalid pattern for {}: {}", r.name, f, e))
            })?;
        }
    }
    if let Some(ts) = &r.timestamps {
        for f in [&ts.created, &ts.updated].into_iter().flatten() {
            let declared = r.fields.iter().find(|c| &c.name == f).ok_or_else(|| ConfigError::MissingReference {
                kind: "timestamp field",
                id: format!("{}.{}", r.name, f),
            })?;
            if declared.type_ != FieldTypeConfig::Date {
                return Err(ConfigError::Validation(format!(
                    "resource {}: timestamp field '{}' must have type date",
                    r.name, f
                )));
            }
        }
    }

    if let Some(ops) = &r.operations {
        for op in ops {
            op.parse::<Operation>()
                .map_err(|o| ConfigError::Validation(format!("resource {}: unknown operation '{}'", r.name, o)))?;
        }
    }

    if let Some(page) = &r.page {
        if page.default_limit == Some(0) || page.max_limit == Some(0) {
            return Err(ConfigError::Validation(format!(
                "resource {}: page limits must be positive",
                r.name
            )));
        }
        if let (Some(d), Some(m)) = (page.default_limit, page.max_limit) {
            if d > m {
                return Err(ConfigError::Validation(format!(
                    "resource {}: default_limit {} exceeds max_limit {}",
                    r.name, d, m
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDocument;

    fn users() -> ResourceConfig {
        let doc: ConfigDocument = serde_json::from_value(serde_json::json!({
            "name": "users",
            "fields": [
                {"name": "email", "type": "string", "filterable": true},
                {"name": "createdAt", "type": "date", "sortable": true}
            ],
            "timestamps": {"created": "createdAt"},
            "validation": {"email": {"required": true}}
        }))
        .unwrap();
        doc.into_resources().remove(0)
    }

    #[test]
    fn accepts_minimal_resource() {
        validate(&[users()]).unwrap();
    }

    #[test]
    fn rejects_duplicate_path_segments() {
        let err = validate(&[users(), users()]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePathSegment(p) if p == "users"));
    }

    #[test]
    fn rejects_validation_rule_for_undeclared_field() {
        let mut r = users();
        r.validation.insert("nickname".into(), Default::default());
        let err = validate_resource(&r).unwrap_err();
        assert!(matches!(err, ConfigError::MissingReference { kind: "validated field", .. }));
    }

    #[test]
    fn rejects_field_names_that_clash_with_query_syntax() {
        let mut r = users();
        r.fields[0].name = "status__in".into();
        assert!(validate_resource(&r).is_err());
        r.fields[0].name = "-email".into();
        assert!(validate_resource(&r).is_err());
    }

    #[test]
    fn rejects_non_date_timestamp() {
        let mut r = users();
        r.timestamps.as_mut().unwrap().updated = Some("email".into());
        assert!(validate_resource(&r).is_err());
    }

    #[test]
    fn rejects_unknown_operation_and_bad_page() {
        let mut r = users();
        r.operations = Some(vec!["list".into(), "purge".into()]);
        assert!(validate_resource(&r).is_err());

        let mut r = users();
        r.page = Some(crate::config::PageConfig {
            default_limit: Some(50),
            max_limit: Some(10),
        });
        assert!(validate_resource(&r).is_err());
    }
}
