//! Query-string compiler: raw `(key, value)` pairs to a validated [`Query`].

use crate::config::{FieldDescriptor, FieldType, IdType, ModelDescriptor};
use crate::query::types::*;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unknown field '{field}'")]
    UnknownField { field: String },
    #[error("field '{field}' cannot be used to {usage}")]
    FieldNotPermitted { field: String, usage: &'static str },
    #[error("unknown operator '{operator}' on field '{field}'")]
    UnknownOperator { field: String, operator: String },
    #[error("operator '{operator}' is not supported on {field_type} field '{field}'")]
    UnsupportedOperator {
        field: String,
        operator: &'static str,
        field_type: &'static str,
    },
    #[error("invalid value '{value}' for field '{field}': expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },
    #[error("search is not supported on this resource")]
    SearchNotSupported,
    #[error("invalid {key} '{value}': expected a non-negative integer")]
    InvalidPagination { key: String, value: String },
}

impl CompileError {
    /// Structured details for the error envelope.
    pub fn details(&self) -> serde_json::Value {
        match self {
            CompileError::UnknownField { field } => json!({ "field": field }),
            CompileError::FieldNotPermitted { field, usage } => json!({ "field": field, "usage": usage }),
            CompileError::UnknownOperator { field, operator } => json!({ "field": field, "operator": operator }),
            CompileError::UnsupportedOperator {
                field,
                operator,
                field_type,
            } => json!({ "field": field, "operator": operator, "type": field_type }),
            CompileError::InvalidValue { field, value, expected } => {
                json!({ "field": field, "value": value, "expected": expected })
            }
            CompileError::SearchNotSupported => json!({ "key": SEARCH_KEY }),
            CompileError::InvalidPagination { key, value } => json!({ "key": key, "value": value }),
        }
    }
}

pub struct QueryCompiler;

impl QueryCompiler {
    /// Compile query-string pairs against a resource descriptor.
    ///
    /// Keys are classified in order: reserved names (`sort`, `search`, `offset`, `limit`), then
    /// `field__op` filters, then bare filterable field names (treated as `eq`). A `__` key whose
    /// prefix is not a field and whose suffix is not an operator is ignored, as is any other key.
    /// Page bounds come from `model.page`.
    pub fn compile(model: &ModelDescriptor, params: &[(String, String)]) -> Result<Query, CompileError> {
        let mut filters = Vec::new();
        let mut sort = Vec::new();
        let mut search = None;
        let mut offset = 0;
        let mut limit = None;

        for (key, raw) in params {
            match key.as_str() {
                SORT_KEY => sort.extend(parse_sort(model, raw)?),
                SEARCH_KEY => search = parse_search(model, raw)?,
                OFFSET_KEY => offset = parse_page_number(key, raw)?,
                LIMIT_KEY => limit = Some(parse_page_number(key, raw)?),
                _ => {
                    if let Some(filter) = parse_filter(model, key, raw)? {
                        filters.push(filter);
                    }
                }
            }
        }

        let limit = limit.unwrap_or(model.page.default_limit).min(model.page.max_limit);
        Ok(Query {
            filters,
            sort,
            search,
            page: Page { offset, limit },
        })
    }
}

fn parse_filter(model: &ModelDescriptor, key: &str, raw: &str) -> Result<Option<Filter>, CompileError> {
    let (field, op) = match key.rsplit_once(OPERATOR_DELIMITER) {
        Some((name, operator)) => {
            let op = FilterOp::parse(operator);
            if op.is_none() && model.field(name).is_none() {
                // Neither a field nor an operator: some unrelated parameter such as `utm__source`.
                return Ok(None);
            }
            let field = permitted(model, name, Usage::Filter)?;
            let op = op.ok_or_else(|| CompileError::UnknownOperator {
                field: name.to_string(),
                operator: operator.to_string(),
            })?;
            (field, op)
        }
        None if model.field(key).is_some() => (permitted(model, key, Usage::Filter)?, FilterOp::Eq),
        None => return Ok(None),
    };
    check_operator(field, op)?;
    let value = coerce(model, field, op, raw)?;
    Ok(Some(Filter::new(field.name.clone(), op, value)))
}

#[derive(Clone, Copy)]
enum Usage {
    Filter,
    Sort,
}

fn permitted<'a>(model: &'a ModelDescriptor, name: &str, usage: Usage) -> Result<&'a FieldDescriptor, CompileError> {
    let field = model.field(name).ok_or_else(|| CompileError::UnknownField {
        field: name.to_string(),
    })?;
    let (allowed, usage) = match usage {
        Usage::Filter => (field.filterable, "filter"),
        Usage::Sort => (field.sortable, "sort"),
    };
    if !allowed {
        return Err(CompileError::FieldNotPermitted {
            field: name.to_string(),
            usage,
        });
    }
    Ok(field)
}

fn check_operator(field: &FieldDescriptor, op: FilterOp) -> Result<(), CompileError> {
    let supported = match op {
        FilterOp::Contains => field.field_type == FieldType::String,
        o if o.is_ordering() => !matches!(field.field_type, FieldType::Boolean | FieldType::Reference),
        _ => true,
    };
    if supported {
        Ok(())
    } else {
        Err(CompileError::UnsupportedOperator {
            field: field.name.clone(),
            operator: op.as_str(),
            field_type: field.field_type.as_str(),
        })
    }
}

fn coerce(model: &ModelDescriptor, field: &FieldDescriptor, op: FilterOp, raw: &str) -> Result<FilterValue, CompileError> {
    if raw.is_empty() {
        return Ok(FilterValue::Null);
    }
    if op == FilterOp::In {
        return raw
            .split(LIST_DELIMITER)
            .map(|part| {
                if part.is_empty() {
                    Ok(FilterValue::Null)
                } else {
                    coerce_scalar(model, field, part)
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FilterValue::List);
    }
    coerce_scalar(model, field, raw)
}

fn coerce_scalar(model: &ModelDescriptor, field: &FieldDescriptor, raw: &str) -> Result<FilterValue, CompileError> {
    let invalid = |expected: &'static str| CompileError::InvalidValue {
        field: field.name.clone(),
        value: raw.to_string(),
        expected,
    };
    match field.field_type {
        FieldType::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(FilterValue::Number)
            .ok_or_else(|| invalid("a number")),
        FieldType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(FilterValue::Bool(true)),
            "false" | "0" => Ok(FilterValue::Bool(false)),
            _ => Err(invalid("a boolean")),
        },
        FieldType::Date => parse_date(raw.trim())
            .map(FilterValue::DateTime)
            .ok_or_else(|| invalid("an RFC 3339 date-time or YYYY-MM-DD date")),
        FieldType::Identifier if field.name == model.id_field => match model.id_type {
            IdType::Uuid => uuid::Uuid::parse_str(raw.trim())
                .map(|u| FilterValue::String(u.to_string()))
                .map_err(|_| invalid("a uuid")),
            IdType::Int => raw
                .trim()
                .parse::<i64>()
                .map(|n| FilterValue::Number(n as f64))
                .map_err(|_| invalid("an integer id")),
            IdType::Text => Ok(FilterValue::String(raw.to_string())),
        },
        FieldType::String | FieldType::Identifier | FieldType::Reference => Ok(FilterValue::String(raw.to_string())),
    }
}

/// RFC 3339 date-time, or a bare `YYYY-MM-DD` date taken as midnight UTC.
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(raw) {
        return Some(d.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_sort(model: &ModelDescriptor, raw: &str) -> Result<Vec<SortSpec>, CompileError> {
    let mut out = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (name, direction) = if let Some(rest) = token.strip_prefix('-') {
            (rest, SortDirection::Desc)
        } else if let Some(rest) = token.strip_prefix('+') {
            (rest, SortDirection::Asc)
        } else {
            (token, SortDirection::Asc)
        };
        let field = permitted(model, name, Usage::Sort)?;
        out.push(SortSpec {
            field: field.name.clone(),
            direction,
        });
    }
    Ok(out)
}

fn parse_search(model: &ModelDescriptor, raw: &str) -> Result<Option<SearchSpec>, CompileError> {
    let term = raw.trim();
    if term.is_empty() {
        return Ok(None);
    }
    let fields = model.searchable_fields();
    if fields.is_empty() {
        return Err(CompileError::SearchNotSupported);
    }
    Ok(Some(SearchSpec {
        term: term.to_string(),
        fields,
    }))
}

fn parse_page_number(key: &str, raw: &str) -> Result<u64, CompileError> {
    raw.trim().parse::<u64>().map_err(|_| CompileError::InvalidPagination {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
