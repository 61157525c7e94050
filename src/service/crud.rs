//! Generic CRUD operations for one resource: schema, query compiler, hooks and repository wired
//! together.

use crate::config::{IdType, ModelDescriptor, Operation};
use crate::error::AppError;
use crate::middleware::RequestContext;
use crate::query::QueryCompiler;
use crate::repository::Repository;
use crate::response::Reply;
use crate::schema::{Schema, ValidationMode};
use crate::service::hooks::{NoHooks, ResourceHooks};
use serde_json::{json, Value};
use std::sync::Arc;

/// Binds one resource's descriptor and schema to the five standard operations. Each operation
/// makes exactly one repository call; errors propagate to the request middleware.
pub struct ResourceRouter {
    descriptor: Arc<ModelDescriptor>,
    schema: Arc<dyn Schema>,
    repository: Arc<dyn Repository>,
    hooks: Arc<dyn ResourceHooks>,
}

impl ResourceRouter {
    pub fn new(descriptor: Arc<ModelDescriptor>, schema: Arc<dyn Schema>, repository: Arc<dyn Repository>) -> Self {
        ResourceRouter {
            descriptor,
            schema,
            repository,
            hooks: Arc::new(NoHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ResourceHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    fn ensure(&self, op: Operation) -> Result<(), AppError> {
        if self.descriptor.allows(op) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} is not enabled for {}",
                op.as_str(),
                self.descriptor.name
            )))
        }
    }

    /// Path id parsed per the resource's id type.
    fn parse_id(&self, raw: &str) -> Result<Value, AppError> {
        let invalid = |expected: &str| AppError::Validation {
            message: format!("invalid id '{}': expected {}", raw, expected),
            details: Some(json!({ "field": self.descriptor.id_field, "value": raw })),
        };
        Ok(match self.descriptor.id_type {
            IdType::Uuid => {
                let u = uuid::Uuid::parse_str(raw).map_err(|_| invalid("a uuid"))?;
                Value::String(u.to_string())
            }
            IdType::Int => {
                let n: i64 = raw.parse().map_err(|_| invalid("an integer"))?;
                Value::Number(n.into())
            }
            IdType::Text if raw.is_empty() => return Err(invalid("a non-empty id")),
            IdType::Text => Value::String(raw.to_string()),
        })
    }

    fn not_found(&self, raw_id: &str) -> AppError {
        AppError::NotFound(format!("{} {} not found", self.descriptor.name, raw_id))
    }

    pub async fn list(&self, ctx: &RequestContext, params: &[(String, String)]) -> Result<Reply, AppError> {
        self.ensure(Operation::List)?;
        let mut query = QueryCompiler::compile(&self.descriptor, params)?;
        query.filters.extend(self.hooks.scope_filters(ctx).await?);
        let found = self.repository.find(&query).await?;
        let items = found.items.into_iter().map(|e| self.schema.project(e)).collect();
        Ok(Reply::list(items, found.total, query.page))
    }

    pub async fn get(&self, ctx: &RequestContext, raw_id: &str) -> Result<Reply, AppError> {
        self.ensure(Operation::Get)?;
        let id = self.parse_id(raw_id)?;
        let scope = self.hooks.scope_filters(ctx).await?;
        let entity = self
            .repository
            .find_one(&id, &scope)
            .await?
            .ok_or_else(|| self.not_found(raw_id))?;
        Ok(Reply::ok(self.schema.project(entity)))
    }

    pub async fn create(&self, ctx: &RequestContext, body: Value) -> Result<Reply, AppError> {
        self.ensure(Operation::Create)?;
        let payload = self.schema.validate_input(body, ValidationMode::Create)?;
        let payload = self.hooks.before_create(ctx, payload).await?;
        let entity = self.repository.insert(payload).await?;
        tracing::debug!(resource = %self.descriptor.name, request_id = %ctx.request_id, "created");
        Ok(Reply::created(self.schema.project(entity)))
    }

    pub async fn update(&self, ctx: &RequestContext, raw_id: &str, body: Value) -> Result<Reply, AppError> {
        self.ensure(Operation::Update)?;
        let id = self.parse_id(raw_id)?;
        let payload = self.schema.validate_input(body, ValidationMode::Update)?;
        let payload = self.hooks.before_update(ctx, &id, payload).await?;
        let scope = self.hooks.scope_filters(ctx).await?;
        let entity = self
            .repository
            .update(&id, &scope, payload)
            .await?
            .ok_or_else(|| self.not_found(raw_id))?;
        Ok(Reply::ok(self.schema.project(entity)))
    }

    pub async fn delete(&self, ctx: &RequestContext, raw_id: &str) -> Result<Reply, AppError> {
        self.ensure(Operation::Delete)?;
        let id = self.parse_id(raw_id)?;
        let scope = self.hooks.scope_filters(ctx).await?;
        if !self.repository.delete(&id, &scope).await? {
            return Err(self.not_found(raw_id));
        }
        tracing::debug!(resource = %self.descriptor.name, request_id = %ctx.request_id, "deleted");
        Ok(Reply::ok(json!({ "id": id, "deleted": true })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_document, resolve, PageSettings};
    use crate::error::ErrorKind;
    use crate::query::{Filter, FilterOp, FilterValue, Query};
    use crate::repository::{FindResult, InMemoryRepository, RepositoryError};
    use crate::schema::{Payload, RuleSchema};
    use crate::service::hooks::OwnerScope;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::Mutex;

    /// Records every call and answers from fixed data.
    #[derive(Default)]
    struct RecordingRepo {
        calls: Mutex<Vec<&'static str>>,
        last_query: Mutex<Option<Query>>,
    }

    impl RecordingRepo {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Repository for RecordingRepo {
        async fn find(&self, query: &Query) -> Result<FindResult, RepositoryError> {
            self.calls.lock().unwrap().push("find");
            *self.last_query.lock().unwrap() = Some(query.clone());
            Ok(FindResult {
                items: vec![json!({"id": 1, "title": "a", "secret": "s"})],
                total: 7,
            })
        }

        async fn find_one(&self, id: &Value, _scope: &[Filter]) -> Result<Option<Value>, RepositoryError> {
            self.calls.lock().unwrap().push("find_one");
            Ok((id == &json!(1)).then(|| json!({"id": 1, "title": "a", "secret": "s"})))
        }

        async fn insert(&self, mut payload: Payload) -> Result<Value, RepositoryError> {
            self.calls.lock().unwrap().push("insert");
            payload.insert("id".into(), json!(2));
            Ok(Value::Object(payload))
        }

        async fn update(&self, _id: &Value, _scope: &[Filter], _payload: Payload) -> Result<Option<Value>, RepositoryError> {
            self.calls.lock().unwrap().push("update");
            Ok(None)
        }

        async fn delete(&self, id: &Value, _scope: &[Filter]) -> Result<bool, RepositoryError> {
            self.calls.lock().unwrap().push("delete");
            Ok(id == &json!(1))
        }
    }

    fn router(operations: &str) -> (ResourceRouter, Arc<RecordingRepo>) {
        let raw = format!(
            r#"{{
                "name": "notes",
                "id_type": "int",
                "fields": [
                    {{"name": "title", "type": "string", "filterable": true, "sortable": true}},
                    {{"name": "secret", "type": "string"}},
                    {{"name": "owner", "type": "string", "filterable": true}}
                ],
                "operations": {},
                "sensitive_fields": ["secret"],
                "validation": {{"title": {{"required": true}}}}
            }}"#,
            operations
        );
        let model = Arc::new(resolve(&parse_document(&raw).unwrap()[0], &PageSettings::default()).unwrap());
        let repo = Arc::new(RecordingRepo::default());
        let schema = Arc::new(RuleSchema::new(model.clone()).unwrap());
        (ResourceRouter::new(model, schema, repo.clone()), repo)
    }

    fn ctx(principal: Option<&str>) -> RequestContext {
        RequestContext {
            request_id: "req-1".into(),
            principal: principal.map(str::to_string),
        }
    }

    fn all_ops() -> (ResourceRouter, Arc<RecordingRepo>) {
        router(r#"["list", "get", "create", "update", "delete"]"#)
    }

    #[tokio::test]
    async fn list_compiles_projects_and_reports_page() {
        let (router, repo) = all_ops();
        let params = vec![("title".to_string(), "a".to_string()), ("limit".to_string(), "1".to_string())];
        let reply = router.list(&ctx(None), &params).await.unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.envelope.data(), &json!([{"id": 1, "title": "a"}]));
        let meta = reply.envelope.meta();
        assert_eq!((meta.total, meta.offset, meta.limit, meta.count), (Some(7), Some(0), Some(1), Some(1)));
        assert_eq!(repo.calls(), vec!["find"]);
    }

    #[tokio::test]
    async fn bad_query_never_reaches_repository() {
        let (router, repo) = all_ops();
        let params = vec![("unknownField__eq".to_string(), "5".to_string())];
        let err = router.list(&ctx(None), &params).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_create_never_inserts() {
        let (router, repo) = all_ops();
        let err = router.create(&ctx(None), json!({"secret": "x"})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(repo.calls().is_empty());

        let reply = router.create(&ctx(None), json!({"title": "b", "secret": "x"})).await.unwrap();
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.envelope.data(), &json!({"id": 2, "title": "b"}));
        assert_eq!(repo.calls(), vec!["insert"]);
    }

    #[tokio::test]
    async fn absent_entities_are_not_found() {
        let (router, _) = all_ops();
        assert_eq!(router.get(&ctx(None), "9").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            router.update(&ctx(None), "9", json!({"title": "c"})).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(router.delete(&ctx(None), "9").await.unwrap_err().kind(), ErrorKind::NotFound);

        let reply = router.delete(&ctx(None), "1").await.unwrap();
        assert_eq!(reply.envelope.data(), &json!({"id": 1, "deleted": true}));
    }

    #[tokio::test]
    async fn malformed_id_is_validation() {
        let (router, repo) = all_ops();
        let err = router.get(&ctx(None), "abc").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn disabled_operation_is_forbidden() {
        let (router, repo) = router(r#"["list", "get"]"#);
        let err = router.delete(&ctx(None), "1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn owner_scope_filters_and_stamps() {
        let (router, repo) = all_ops();
        let router = router.with_hooks(Arc::new(OwnerScope::new("owner")));

        router.list(&ctx(Some("u-1")), &[]).await.unwrap();
        let query = repo.last_query.lock().unwrap().clone().unwrap();
        let scope = query.filters.last().unwrap();
        assert_eq!((scope.field.as_str(), scope.op), ("owner", FilterOp::Eq));
        assert_eq!(scope.value, FilterValue::String("u-1".into()));

        let reply = router.create(&ctx(Some("u-1")), json!({"title": "mine"})).await.unwrap();
        assert_eq!(reply.envelope.data()["owner"], "u-1");

        let err = router.list(&ctx(None), &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn owner_scope_hides_other_principals_records() {
        let (router, _) = all_ops();
        let model = router.descriptor.clone();
        let router = ResourceRouter::new(
            model.clone(),
            Arc::new(RuleSchema::new(model.clone()).unwrap()),
            Arc::new(InMemoryRepository::new(model)),
        )
        .with_hooks(Arc::new(OwnerScope::new("owner")));

        let alice = ctx(Some("alice"));
        let bob = ctx(Some("bob"));
        let created = router.create(&alice, json!({"title": "alice's note"})).await.unwrap();
        let id = created.envelope.data()["id"].to_string();

        assert_eq!(router.get(&bob, &id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            router.update(&bob, &id, json!({"title": "mine now"})).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(router.delete(&bob, &id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(router.list(&bob, &[]).await.unwrap().envelope.meta().total, Some(0));

        let reply = router.get(&alice, &id).await.unwrap();
        assert_eq!(reply.envelope.data()["title"], "alice's note");
        router.delete(&alice, &id).await.unwrap();
    }
}
