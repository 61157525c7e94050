//! Builds parameterized SELECT, COUNT, INSERT, UPDATE and DELETE statements for one resource.
//!
//! Identifiers only ever come from resource config. Every value is bound as a text parameter and
//! cast in SQL according to the field type.

use crate::config::{FieldDescriptor, FieldType, IdType, ModelDescriptor};
use crate::query::{Filter, FilterOp, FilterValue, Query, SearchSpec, SortDirection};
use crate::schema::Payload;
use serde_json::Value;

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn table(model: &ModelDescriptor) -> String {
    match &model.storage.schema {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(&model.storage.table)),
        None => quoted(&model.storage.table),
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

impl QueryBuf {
    fn push_param(&mut self, v: Option<String>) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// Text form of a JSON value for binding. Objects and arrays bind as JSON text.
pub(crate) fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn id_cast(model: &ModelDescriptor) -> &'static str {
    match model.id_type {
        IdType::Uuid => "::uuid",
        IdType::Int => "::bigint",
        IdType::Text => "::text",
    }
}

/// Cast applied to a bound value compared against a column in WHERE clauses.
fn compare_cast(field: &FieldDescriptor) -> &'static str {
    match field.field_type {
        FieldType::Number => "::numeric",
        FieldType::Boolean => "::boolean",
        FieldType::Date => "::timestamptz",
        FieldType::String | FieldType::Identifier | FieldType::Reference => "",
    }
}

/// Cast applied to a bound value written to a column.
fn write_cast(model: &ModelDescriptor, field: &FieldDescriptor) -> String {
    if let Some(t) = &field.column_type {
        return format!("::{}", t);
    }
    if field.name == model.id_field {
        return id_cast(model).to_string();
    }
    compare_cast(field).to_string()
}

/// Cast applied to a filter value. The id column is compared natively.
fn filter_cast(model: &ModelDescriptor, field: &FieldDescriptor) -> &'static str {
    if field.name == model.id_field {
        id_cast(model)
    } else {
        compare_cast(field)
    }
}

/// Column expression in WHERE and ORDER BY clauses. The id column is used as is; other
/// identifiers and references compare as text whatever their column type.
fn column_expr(model: &ModelDescriptor, field: &FieldDescriptor) -> String {
    match field.field_type {
        _ if field.name == model.id_field => quoted(&field.name),
        FieldType::Identifier | FieldType::Reference => format!("{}::text", quoted(&field.name)),
        _ => quoted(&field.name),
    }
}

/// SELECT list: declared fields, with numeric/decimal columns read back as float8 and custom
/// enum types (schema-qualified) as text.
fn select_column_list(model: &ModelDescriptor) -> String {
    model
        .fields
        .iter()
        .map(|f| {
            let q = quoted(&f.name);
            let column_type = f.column_type.as_deref().unwrap_or("").to_lowercase();
            if column_type.starts_with("numeric") || column_type.starts_with("decimal") {
                format!("{}::float8 AS {}", q, q)
            } else if column_type.contains('.') {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn blank_match(field: &FieldDescriptor, negate: bool) -> String {
    let col = quoted(&field.name);
    if negate {
        format!("({} IS NOT NULL AND {}::text <> '')", col, col)
    } else {
        format!("({} IS NULL OR {}::text = '')", col, col)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn filter_clause(q: &mut QueryBuf, model: &ModelDescriptor, field: &FieldDescriptor, filter: &Filter) -> String {
    let col = column_expr(model, field);
    let cast = filter_cast(model, field);
    match (&filter.op, &filter.value) {
        (FilterOp::Eq, FilterValue::Null) => blank_match(field, false),
        (FilterOp::Ne, FilterValue::Null) => blank_match(field, true),
        (_, FilterValue::Null) => "FALSE".to_string(),
        (FilterOp::In, FilterValue::List(values)) => {
            let placeholders: Vec<String> = values
                .iter()
                .filter(|v| !matches!(v, FilterValue::Null))
                .map(|v| format!("${}{}", q.push_param(Some(v.to_param())), cast))
                .collect();
            let mut parts = Vec::new();
            if !placeholders.is_empty() {
                parts.push(format!("{} IN ({})", col, placeholders.join(", ")));
            }
            if values.iter().any(|v| matches!(v, FilterValue::Null)) {
                parts.push(blank_match(field, false));
            }
            format!("({})", parts.join(" OR "))
        }
        (FilterOp::Contains, value) => {
            let n = q.push_param(Some(format!("%{}%", escape_like(&value.to_param()))));
            format!("{} ILIKE ${}", col, n)
        }
        (op, value) => {
            let n = q.push_param(Some(value.to_param()));
            let sql_op = match op {
                FilterOp::Eq | FilterOp::In => "=",
                FilterOp::Ne => "IS DISTINCT FROM",
                FilterOp::Gt => ">",
                FilterOp::Gte => ">=",
                FilterOp::Lt => "<",
                FilterOp::Lte => "<=",
                FilterOp::Contains => "ILIKE",
            };
            format!("{} {} ${}{}", col, sql_op, n, cast)
        }
    }
}

fn search_clause(q: &mut QueryBuf, search: &SearchSpec) -> String {
    let n = q.push_param(Some(format!("%{}%", escape_like(&search.term))));
    let parts: Vec<String> = search
        .fields
        .iter()
        .map(|f| format!("{}::text ILIKE ${}", quoted(f), n))
        .collect();
    format!("({})", parts.join(" OR "))
}

/// Conjunctive clauses for `filters`. Filters on fields the model does not declare are skipped.
fn filter_clauses(q: &mut QueryBuf, model: &ModelDescriptor, filters: &[Filter]) -> Vec<String> {
    filters
        .iter()
        .filter_map(|filter| {
            let field = model.field(&filter.field)?;
            Some(filter_clause(q, model, field, filter))
        })
        .collect()
}

/// WHERE clause (with leading space) for the query's filters and search.
fn where_clause(q: &mut QueryBuf, model: &ModelDescriptor, query: &Query) -> String {
    let mut parts = filter_clauses(q, model, &query.filters);
    if let Some(search) = query.search.as_ref().filter(|s| !s.fields.is_empty()) {
        parts.push(search_clause(q, search));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT one page. Requested sort keys first, then the primary key so paging is deterministic.
pub fn select_page(model: &ModelDescriptor, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::default();
    let where_sql = where_clause(&mut q, model, query);
    let mut order: Vec<String> = query
        .sort
        .iter()
        .map(|s| {
            let dir = match s.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            let col = match model.field(&s.field) {
                Some(field) => column_expr(model, field),
                None => quoted(&s.field),
            };
            format!("{} {}", col, dir)
        })
        .collect();
    if !query.sort.iter().any(|s| s.field == model.id_field) {
        order.push(format!("{} ASC", quoted(&model.id_field)));
    }
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        select_column_list(model),
        table(model),
        where_sql,
        order.join(", "),
        query.page.limit,
        query.page.offset
    );
    q
}

/// COUNT(*) over the same predicates as [`select_page`].
pub fn count(model: &ModelDescriptor, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::default();
    let where_sql = where_clause(&mut q, model, query);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table(model), where_sql);
    q
}

/// `"id" = $n` plus the scope filters, joined with AND.
fn id_predicate(q: &mut QueryBuf, model: &ModelDescriptor, id: &Value, scope: &[Filter]) -> String {
    let n = q.push_param(value_text(id));
    let mut parts = vec![format!("{} = ${}{}", quoted(&model.id_field), n, id_cast(model))];
    parts.extend(filter_clauses(q, model, scope));
    parts.join(" AND ")
}

pub fn select_by_id(model: &ModelDescriptor, id: &Value, scope: &[Filter]) -> QueryBuf {
    let mut q = QueryBuf::default();
    let predicate = id_predicate(&mut q, model, id, scope);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_column_list(model),
        table(model),
        predicate
    );
    q
}

/// INSERT the payload's declared fields; timestamp fields are set to NOW(). An absent id is left
/// to the column default.
pub fn insert(model: &ModelDescriptor, payload: &Payload) -> QueryBuf {
    let mut q = QueryBuf::default();
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for field in &model.fields {
        if model.is_read_only(&field.name) {
            cols.push(quoted(&field.name));
            values.push("NOW()".to_string());
            continue;
        }
        let Some(v) = payload.get(&field.name) else { continue };
        let n = q.push_param(value_text(v));
        cols.push(quoted(&field.name));
        values.push(format!("${}{}", n, write_cast(model, field)));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table(model), select_column_list(model))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table(model),
            cols.join(", "),
            values.join(", "),
            select_column_list(model)
        )
    };
    q
}

/// UPDATE by id within `scope`: SET only the declared fields present in the payload, plus the
/// updated timestamp. With nothing to set this degrades to [`select_by_id`].
pub fn update(model: &ModelDescriptor, id: &Value, scope: &[Filter], payload: &Payload) -> QueryBuf {
    let mut q = QueryBuf::default();
    let mut sets = Vec::new();
    for field in &model.fields {
        if field.name == model.id_field || model.is_read_only(&field.name) {
            continue;
        }
        let Some(v) = payload.get(&field.name) else { continue };
        let n = q.push_param(value_text(v));
        sets.push(format!("{} = ${}{}", quoted(&field.name), n, write_cast(model, field)));
    }
    if sets.is_empty() {
        return select_by_id(model, id, scope);
    }
    if let Some(updated) = &model.timestamps.updated {
        sets.push(format!("{} = NOW()", quoted(updated)));
    }
    let predicate = id_predicate(&mut q, model, id, scope);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        table(model),
        sets.join(", "),
        predicate,
        select_column_list(model)
    );
    q
}

pub fn delete(model: &ModelDescriptor, id: &Value, scope: &[Filter]) -> QueryBuf {
    let mut q = QueryBuf::default();
    let predicate = id_predicate(&mut q, model, id, scope);
    q.sql = format!("DELETE FROM {} WHERE {}", table(model), predicate);
    q
}
