//! In-process repository that evaluates compiled queries over a vector of rows.

use crate::config::{FieldType, IdType, ModelDescriptor};
use crate::query::{compiler::parse_date, Filter, FilterOp, FilterValue, Query, SortDirection};
use crate::repository::{FindResult, Repository, RepositoryError};
use crate::schema::Payload;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Field value normalized by its declared type for comparison.
#[derive(Debug)]
enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime<Utc>),
    String(Cow<'a, str>),
}

impl<'a> Comparable<'a> {
    fn stored(field_type: Option<FieldType>, v: Option<&'a Value>) -> Self {
        match v {
            None | Some(Value::Null) => Comparable::Null,
            Some(Value::Bool(b)) => Comparable::Bool(*b),
            Some(Value::Number(n)) => match field_type {
                Some(FieldType::Identifier) | Some(FieldType::Reference) => Comparable::String(Cow::Owned(n.to_string())),
                _ => n.as_f64().map(Comparable::Number).unwrap_or(Comparable::Null),
            },
            Some(Value::String(s)) => match field_type {
                Some(FieldType::Date) => parse_date(s)
                    .map(Comparable::DateTime)
                    .unwrap_or(Comparable::String(Cow::Borrowed(s))),
                _ => Comparable::String(Cow::Borrowed(s)),
            },
            Some(_) => Comparable::Null,
        }
    }

    fn wanted(v: &'a FilterValue) -> Self {
        match v {
            FilterValue::Null | FilterValue::List(_) => Comparable::Null,
            FilterValue::String(s) => Comparable::String(Cow::Borrowed(s)),
            FilterValue::Number(n) => Comparable::Number(*n),
            FilterValue::Bool(b) => Comparable::Bool(*b),
            FilterValue::DateTime(d) => Comparable::DateTime(*d),
        }
    }

    /// Null or empty string: what a `field__eq=` filter matches.
    fn is_blank(&self) -> bool {
        match self {
            Comparable::Null => true,
            Comparable::String(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn matches_value(actual: &Comparable<'_>, op: FilterOp, value: &FilterValue) -> bool {
    if let FilterValue::Null = value {
        return match op {
            FilterOp::Eq => actual.is_blank(),
            FilterOp::Ne => !actual.is_blank(),
            _ => false,
        };
    }
    let wanted = Comparable::wanted(value);
    match op {
        FilterOp::Eq => actual == &wanted,
        FilterOp::Ne => actual != &wanted,
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => match actual.partial_cmp(&wanted) {
            Some(ordering) => match op {
                FilterOp::Gt => ordering == Ordering::Greater,
                FilterOp::Gte => ordering != Ordering::Less,
                FilterOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            },
            None => false,
        },
        FilterOp::In => match value {
            FilterValue::List(values) => values.iter().any(|v| matches_value(actual, FilterOp::Eq, v)),
            single => matches_value(actual, FilterOp::Eq, single),
        },
        FilterOp::Contains => match (actual, &wanted) {
            (Comparable::String(a), Comparable::String(b)) => a.to_lowercase().contains(&b.to_lowercase()),
            _ => false,
        },
    }
}

/// Nulls sort after every value in ascending order.
fn compare_for_sort(a: &Comparable<'_>, b: &Comparable<'_>) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    }
}

impl Comparable<'_> {
    fn is_null(&self) -> bool {
        matches!(self, Comparable::Null)
    }
}

/// Id as a string key: stored ids are strings (uuid/text) or integers.
fn id_key(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Default)]
struct Rows {
    /// Insertion order; the default list order.
    items: Vec<Payload>,
    last_int_id: i64,
}

pub struct InMemoryRepository {
    model: Arc<ModelDescriptor>,
    rows: RwLock<Rows>,
}

impl InMemoryRepository {
    pub fn new(model: Arc<ModelDescriptor>) -> Self {
        InMemoryRepository {
            model,
            rows: RwLock::new(Rows::default()),
        }
    }

    /// Type a stored value is compared as. Integer ids compare as numbers.
    fn field_type(&self, name: &str) -> Option<FieldType> {
        if name == self.model.id_field && self.model.id_type == IdType::Int {
            return Some(FieldType::Number);
        }
        self.model.field(name).map(|f| f.field_type)
    }

    fn matches_filters(&self, row: &Payload, filters: &[Filter]) -> bool {
        filters.iter().all(|Filter { field, op, value }| {
            let actual = Comparable::stored(self.field_type(field), row.get(field));
            matches_value(&actual, *op, value)
        })
    }

    fn row_matches(&self, row: &Payload, query: &Query) -> bool {
        if !self.matches_filters(row, &query.filters) {
            return false;
        }
        match &query.search {
            Some(search) => {
                let term = search.term.to_lowercase();
                search.fields.iter().any(|f| {
                    row.get(f)
                        .and_then(Value::as_str)
                        .map(|s| s.to_lowercase().contains(&term))
                        .unwrap_or(false)
                })
            }
            None => true,
        }
    }

    /// Index of the row with this id, if it also matches `scope`.
    fn position(&self, rows: &Rows, id: &Value, scope: &[Filter]) -> Option<usize> {
        let key = id_key(id)?;
        rows.items.iter().position(|row| {
            row.get(&self.model.id_field).and_then(id_key).as_deref() == Some(key.as_str())
                && self.matches_filters(row, scope)
        })
    }

    /// Reject a write that would duplicate a unique field. `skip` is the row being updated.
    fn check_unique(&self, rows: &Rows, payload: &Payload, skip: Option<usize>) -> Result<(), RepositoryError> {
        for field in &self.model.unique_fields {
            let Some(candidate) = payload.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let field_type = self.field_type(field);
            let wanted = Comparable::stored(field_type, Some(candidate));
            let taken = rows
                .items
                .iter()
                .enumerate()
                .any(|(i, row)| Some(i) != skip && Comparable::stored(field_type, row.get(field)) == wanted);
            if taken {
                return Err(RepositoryError::Conflict(format!("{} {} already exists", self.model.name, field)));
            }
        }
        Ok(())
    }

    fn next_id(&self, rows: &mut Rows) -> Value {
        match self.model.id_type {
            IdType::Int => {
                rows.last_int_id += 1;
                Value::Number(rows.last_int_id.into())
            }
            IdType::Uuid | IdType::Text => Value::String(uuid::Uuid::new_v4().to_string()),
        }
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find(&self, query: &Query) -> Result<FindResult, RepositoryError> {
        let rows = self.rows.read().await;
        let mut matched: Vec<&Payload> = rows.items.iter().filter(|row| self.row_matches(row, query)).collect();
        if !query.sort.is_empty() {
            matched.sort_by(|a, b| {
                for key in &query.sort {
                    let t = self.field_type(&key.field);
                    let ordering = compare_for_sort(
                        &Comparable::stored(t, a.get(&key.field)),
                        &Comparable::stored(t, b.get(&key.field)),
                    );
                    let ordering = match key.direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(usize::try_from(query.page.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.page.limit).unwrap_or(usize::MAX))
            .map(|row| Value::Object(row.clone()))
            .collect();
        Ok(FindResult { items, total })
    }

    async fn find_one(&self, id: &Value, scope: &[Filter]) -> Result<Option<Value>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(self.position(&rows, id, scope).map(|i| Value::Object(rows.items[i].clone())))
    }

    async fn insert(&self, mut payload: Payload) -> Result<Value, RepositoryError> {
        let mut rows = self.rows.write().await;
        let id_field = self.model.id_field.clone();
        match payload.get(&id_field).filter(|v| !v.is_null()).cloned() {
            Some(id) => {
                if self.position(&rows, &id, &[]).is_some() {
                    return Err(RepositoryError::Conflict(format!("{} {} already exists", self.model.name, id)));
                }
                if let Some(n) = id.as_i64() {
                    rows.last_int_id = rows.last_int_id.max(n);
                }
            }
            None => {
                let id = self.next_id(&mut rows);
                payload.insert(id_field, id);
            }
        }
        self.check_unique(&rows, &payload, None)?;
        let ts = &self.model.timestamps;
        for f in [&ts.created, &ts.updated].into_iter().flatten() {
            payload.insert(f.clone(), now());
        }
        rows.items.push(payload.clone());
        tracing::debug!(resource = %self.model.name, "inserted row");
        Ok(Value::Object(payload))
    }

    async fn update(&self, id: &Value, scope: &[Filter], mut payload: Payload) -> Result<Option<Value>, RepositoryError> {
        let mut rows = self.rows.write().await;
        let Some(index) = self.position(&rows, id, scope) else {
            return Ok(None);
        };
        payload.remove(&self.model.id_field);
        self.check_unique(&rows, &payload, Some(index))?;
        if let Some(f) = &self.model.timestamps.updated {
            payload.insert(f.clone(), now());
        }
        let row = &mut rows.items[index];
        row.extend(payload);
        Ok(Some(Value::Object(row.clone())))
    }

    async fn delete(&self, id: &Value, scope: &[Filter]) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.write().await;
        match self.position(&rows, id, scope) {
            Some(index) => {
                rows.items.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_document, resolve, PageSettings};
    use crate::query::QueryCompiler;
    use serde_json::json;

    fn repo() -> InMemoryRepository {
        let raw = r#"{
            "name": "tickets",
            "id_type": "int",
            "fields": [
                {"name": "title", "type": "string", "filterable": true, "sortable": true, "searchable": true},
                {"name": "status", "type": "string", "filterable": true},
                {"name": "priority", "type": "number", "filterable": true, "sortable": true},
                {"name": "code", "type": "string"},
                {"name": "createdAt", "type": "date", "filterable": true, "sortable": true},
                {"name": "updatedAt", "type": "date"}
            ],
            "unique": ["code"],
            "timestamps": {"created": "createdAt", "updated": "updatedAt"}
        }"#;
        let model = resolve(&parse_document(raw).unwrap()[0], &PageSettings::default()).unwrap();
        InMemoryRepository::new(Arc::new(model))
    }

    fn payload(v: Value) -> Payload {
        match v {
            Value::Object(m) => m,
            _ => panic!("object expected"),
        }
    }

    async fn seeded() -> InMemoryRepository {
        let repo = repo();
        for (title, status, priority) in [("Disk full", "open", 3), ("Login broken", "closed", 1), ("Slow disk", "open", 2)] {
            repo.insert(payload(json!({"title": title, "status": status, "priority": priority})))
                .await
                .unwrap();
        }
        repo.insert(payload(json!({"title": "Untriaged"}))).await.unwrap();
        repo
    }

    fn compile(repo: &InMemoryRepository, params: &[(&str, &str)]) -> Query {
        let params: Vec<(String, String)> = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        QueryCompiler::compile(&repo.model, &params).unwrap()
    }

    fn titles(result: &FindResult) -> Vec<&str> {
        result.items.iter().map(|i| i["title"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_timestamps() {
        let repo = repo();
        let a = repo.insert(payload(json!({"title": "a"}))).await.unwrap();
        let b = repo.insert(payload(json!({"title": "b"}))).await.unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
        assert!(a["createdAt"].is_string());
        assert_eq!(repo.find_one(&json!(2), &[]).await.unwrap().unwrap()["title"], "b");
    }

    #[tokio::test]
    async fn filters_sort_and_paginate() {
        let repo = seeded().await;
        let q = compile(&repo, &[("status", "open"), ("sort", "-priority")]);
        let result = repo.find(&q).await.unwrap();
        assert_eq!(titles(&result), vec!["Disk full", "Slow disk"]);
        assert_eq!(result.total, 2);

        let q = compile(&repo, &[("sort", "priority"), ("limit", "2"), ("offset", "1")]);
        let result = repo.find(&q).await.unwrap();
        assert_eq!(result.total, 4);
        assert_eq!(titles(&result), vec!["Slow disk", "Disk full"]);
    }

    #[tokio::test]
    async fn null_in_and_contains_filters() {
        let repo = seeded().await;
        let blank = repo.find(&compile(&repo, &[("status__eq", "")])).await.unwrap();
        assert_eq!(titles(&blank), vec!["Untriaged"]);

        let listed = repo.find(&compile(&repo, &[("priority__in", "1|3")])).await.unwrap();
        assert_eq!(listed.total, 2);

        let found = repo.find(&compile(&repo, &[("title__contains", "DISK")])).await.unwrap();
        assert_eq!(found.total, 2);

        let searched = repo.find(&compile(&repo, &[("search", "login")])).await.unwrap();
        assert_eq!(titles(&searched), vec!["Login broken"]);
    }

    #[tokio::test]
    async fn duplicate_filters_are_conjunctive() {
        let repo = seeded().await;
        let q = compile(&repo, &[("priority__gte", "2"), ("priority__lte", "2")]);
        assert_eq!(titles(&repo.find(&q).await.unwrap()), vec!["Slow disk"]);
    }

    #[tokio::test]
    async fn unique_fields_conflict() {
        let repo = repo();
        repo.insert(payload(json!({"title": "a", "code": "T-1"}))).await.unwrap();
        let err = repo.insert(payload(json!({"title": "b", "code": "T-1"}))).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let b = repo.insert(payload(json!({"title": "b", "code": "T-2"}))).await.unwrap();
        let err = repo.update(&b["id"], &[], payload(json!({"code": "T-1"}))).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(repo.update(&b["id"], &[], payload(json!({"code": "T-2"}))).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_and_delete_report_absence() {
        let repo = seeded().await;
        assert!(repo.update(&json!(99), &[], Payload::new()).await.unwrap().is_none());
        let updated = repo.update(&json!(1), &[], payload(json!({"status": "closed"}))).await.unwrap().unwrap();
        assert_eq!(updated["status"], "closed");
        assert_eq!(updated["title"], "Disk full");
        assert!(repo.delete(&json!(1), &[]).await.unwrap());
        assert!(!repo.delete(&json!(1), &[]).await.unwrap());
    }

    #[tokio::test]
    async fn int_ids_compare_numerically() {
        let repo = repo();
        for i in 1..=12 {
            repo.insert(payload(json!({"title": format!("t{}", i)}))).await.unwrap();
        }
        let ids = |result: FindResult| -> Vec<i64> { result.items.iter().map(|i| i["id"].as_i64().unwrap()).collect() };

        let above = repo.find(&compile(&repo, &[("id__gt", "9")])).await.unwrap();
        assert_eq!(ids(above), vec![10, 11, 12]);

        let first = repo.find(&compile(&repo, &[("sort", "id"), ("limit", "4")])).await.unwrap();
        assert_eq!(ids(first), vec![1, 2, 3, 4]);

        let last = repo.find(&compile(&repo, &[("sort", "-id"), ("limit", "2")])).await.unwrap();
        assert_eq!(ids(last), vec![12, 11]);

        let picked = repo.find(&compile(&repo, &[("id__in", "2|11"), ("id__lte", "10")])).await.unwrap();
        assert_eq!(ids(picked), vec![2]);
    }

    #[tokio::test]
    async fn by_id_operations_respect_scope() {
        let repo = seeded().await;
        let open = [Filter::new("status", FilterOp::Eq, FilterValue::String("open".into()))];

        assert!(repo.find_one(&json!(1), &open).await.unwrap().is_some());
        // Row 2 exists but is closed.
        assert!(repo.find_one(&json!(2), &open).await.unwrap().is_none());
        assert!(repo
            .update(&json!(2), &open, payload(json!({"title": "x"})))
            .await
            .unwrap()
            .is_none());
        assert!(!repo.delete(&json!(2), &open).await.unwrap());
        assert_eq!(repo.find_one(&json!(2), &[]).await.unwrap().unwrap()["title"], "Login broken");
    }
}
