//! Compiled query descriptor handed to repositories.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Reserved query-string keys. Every other key is a filter candidate.
pub const SORT_KEY: &str = "sort";
pub const SEARCH_KEY: &str = "search";
pub const OFFSET_KEY: &str = "offset";
pub const LIMIT_KEY: &str = "limit";
/// Separates field and operator in a filter key: `status__eq`.
pub const OPERATOR_DELIMITER: &str = "__";
/// Separates the values of an `in` filter: `status__in=active|pending`.
pub const LIST_DELIMITER: &str = "|";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
}

impl FilterOp {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => FilterOp::Eq,
            "ne" => FilterOp::Ne,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "in" => FilterOp::In,
            "contains" => FilterOp::Contains,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
            FilterOp::Contains => "contains",
        }
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte)
    }
}

/// A filter value already coerced to the field's semantic type.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    /// Explicit match against null/empty (`field__eq=`).
    Null,
    String(String),
    Number(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Query-string form; inverse of the compiler's coercion.
    pub fn to_param(&self) -> String {
        match self {
            FilterValue::Null => String::new(),
            FilterValue::String(s) => s.clone(),
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::DateTime(d) => d.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            FilterValue::List(values) => values
                .iter()
                .map(FilterValue::to_param)
                .collect::<Vec<_>>()
                .join(LIST_DELIMITER),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Null => Value::Null,
            FilterValue::String(s) => Value::String(s.clone()),
            FilterValue::Number(n) => serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::DateTime(_) => Value::String(self.to_param()),
            FilterValue::List(values) => Value::Array(values.iter().map(FilterValue::to_json).collect()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        Filter {
            field: field.into(),
            op,
            value,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Free-text term and the searchable fields it applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchSpec {
    pub term: String,
    pub fields: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

/// Compiled, validated filter/sort/search/pagination intent for one request.
///
/// Filters are conjunctive and kept in input order. An empty `sort` means the
/// backend's default order.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortSpec>,
    pub search: Option<SearchSpec>,
    pub page: Page,
}

impl Query {
    /// Re-serialize into query-string pairs. Compiling the result against the same
    /// descriptor yields an equal query.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| {
                (
                    format!("{}{}{}", f.field, OPERATOR_DELIMITER, f.op.as_str()),
                    f.value.to_param(),
                )
            })
            .collect();
        if !self.sort.is_empty() {
            let tokens: Vec<String> = self
                .sort
                .iter()
                .map(|s| match s.direction {
                    SortDirection::Asc => s.field.clone(),
                    SortDirection::Desc => format!("-{}", s.field),
                })
                .collect();
            out.push((SORT_KEY.to_string(), tokens.join(",")));
        }
        if let Some(search) = &self.search {
            out.push((SEARCH_KEY.to_string(), search.term.clone()));
        }
        out.push((OFFSET_KEY.to_string(), self.page.offset.to_string()));
        out.push((LIMIT_KEY.to_string(), self.page.limit.to_string()));
        out
    }
}
