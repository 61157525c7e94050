//! PostgreSQL repository: compiled queries become parameterized SQL over a shared pool.

pub mod builder;

use crate::config::ModelDescriptor;
use crate::query::{Filter, Query};
use crate::repository::{FindResult, Repository, RepositoryError};
use crate::schema::Payload;
use async_trait::async_trait;
use builder::QueryBuf;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query as SqlxQuery;
use sqlx::Postgres;
use std::sync::Arc;

pub struct PgRepository {
    pool: PgPool,
    model: Arc<ModelDescriptor>,
}

impl PgRepository {
    pub fn new(pool: PgPool, model: Arc<ModelDescriptor>) -> Self {
        PgRepository { pool, model }
    }

    /// Open a pool shared by every resource's repository.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, RepositoryError> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Value>, RepositoryError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(sqlx::query(&q.sql), q)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(|r| row_to_json(&r)))
    }
}

fn bind_all<'q>(mut query: SqlxQuery<'q, Postgres, PgArguments>, q: &'q QueryBuf) -> SqlxQuery<'q, Postgres, PgArguments> {
    for p in &q.params {
        query = query.bind(p.as_deref());
    }
    query
}

/// Unique and foreign-key violations are the client's conflict; everything else is storage.
fn map_sqlx_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() || db.is_foreign_key_violation() {
            return RepositoryError::Conflict(db.message().to_string());
        }
    }
    RepositoryError::Backend(e.to_string())
}

#[async_trait]
impl Repository for PgRepository {
    async fn find(&self, query: &Query) -> Result<FindResult, RepositoryError> {
        let page = builder::select_page(&self.model, query);
        tracing::debug!(sql = %page.sql, params = ?page.params, "query");
        let rows = bind_all(sqlx::query(&page.sql), &page)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let count = builder::count(&self.model, query);
        tracing::debug!(sql = %count.sql, params = ?count.params, "query");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count.sql);
        for p in &count.params {
            count_query = count_query.bind(p.as_deref());
        }
        let total = count_query.fetch_one(&self.pool).await.map_err(map_sqlx_error)?;

        Ok(FindResult {
            items: rows.iter().map(row_to_json).collect(),
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn find_one(&self, id: &Value, scope: &[Filter]) -> Result<Option<Value>, RepositoryError> {
        self.fetch_optional(&builder::select_by_id(&self.model, id, scope)).await
    }

    async fn insert(&self, payload: Payload) -> Result<Value, RepositoryError> {
        let row = self.fetch_optional(&builder::insert(&self.model, &payload)).await?;
        row.ok_or_else(|| RepositoryError::Backend(format!("insert into {} returned no row", self.model.storage.table)))
    }

    async fn update(&self, id: &Value, scope: &[Filter], payload: Payload) -> Result<Option<Value>, RepositoryError> {
        self.fetch_optional(&builder::update(&self.model, id, scope, &payload)).await
    }

    async fn delete(&self, id: &Value, scope: &[Filter]) -> Result<bool, RepositoryError> {
        let q = builder::delete(&self.model, id, scope);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let done = bind_all(sqlx::query(&q.sql), &q)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(done.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .fetch_optional(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

fn row_to_json(row: &PgRow) -> Value {
    use sqlx::{Column, Row};
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

/// Decode one cell by trying the column types resources map to, most specific first.
fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        return serde_json::Number::from_f64(f64::from(n)).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        return serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.and_utc().to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
