//! Business-logic hooks around the standard CRUD flow.

use crate::error::AppError;
use crate::middleware::RequestContext;
use crate::query::{Filter, FilterOp, FilterValue};
use crate::schema::Payload;
use async_trait::async_trait;
use serde_json::Value;

/// Optional per-resource hooks. Every method defaults to a no-op.
#[async_trait]
pub trait ResourceHooks: Send + Sync {
    /// Extra conjunctive filters applied to every list query and to get, update and delete by id.
    /// An entity outside these filters is reported as not found.
    async fn scope_filters(&self, _ctx: &RequestContext) -> Result<Vec<Filter>, AppError> {
        Ok(Vec::new())
    }

    /// Runs after schema validation, before insert.
    async fn before_create(&self, _ctx: &RequestContext, payload: Payload) -> Result<Payload, AppError> {
        Ok(payload)
    }

    /// Runs after schema validation, before update.
    async fn before_update(&self, _ctx: &RequestContext, _id: &Value, payload: Payload) -> Result<Payload, AppError> {
        Ok(payload)
    }
}

pub struct NoHooks;

impl ResourceHooks for NoHooks {}

/// Records belong to the request principal: create stamps `field` with it, every read and write
/// only sees the principal's records, and updates cannot reassign it.
///
/// The principal is read from [`PRINCIPAL_HEADER`](crate::middleware::PRINCIPAL_HEADER), which any
/// client can send. Deploy this behind a gateway that sets it from verified credentials, or install
/// a [`PreCheck`](crate::middleware::PreCheck) that rejects requests whose header was not vouched for.
pub struct OwnerScope {
    field: String,
}

impl OwnerScope {
    pub fn new(field: impl Into<String>) -> Self {
        OwnerScope { field: field.into() }
    }

    fn principal<'a>(&self, ctx: &'a RequestContext) -> Result<&'a str, AppError> {
        ctx.principal
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("a principal is required for this resource".into()))
    }
}

#[async_trait]
impl ResourceHooks for OwnerScope {
    async fn scope_filters(&self, ctx: &RequestContext) -> Result<Vec<Filter>, AppError> {
        let principal = self.principal(ctx)?;
        Ok(vec![Filter::new(
            self.field.clone(),
            FilterOp::Eq,
            FilterValue::String(principal.to_string()),
        )])
    }

    async fn before_create(&self, ctx: &RequestContext, mut payload: Payload) -> Result<Payload, AppError> {
        let principal = self.principal(ctx)?;
        payload.insert(self.field.clone(), Value::String(principal.to_string()));
        Ok(payload)
    }

    async fn before_update(&self, _ctx: &RequestContext, _id: &Value, payload: Payload) -> Result<Payload, AppError> {
        if payload.contains_key(&self.field) {
            return Err(AppError::Forbidden(format!("{} cannot be changed", self.field)));
        }
        Ok(payload)
    }
}
