//! Resource CRUD handlers. Each resource's routes carry its router as state.

use crate::error::AppError;
use crate::middleware::RequestContext;
use crate::response::Reply;
use crate::service::ResourceRouter;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Uri,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn parse_body(body: &[u8]) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::validation("request body is required"));
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation {
        message: format!("malformed JSON body: {}", e),
        details: Some(json!({ "line": e.line(), "column": e.column() })),
    })
}

pub async fn list(
    State(router): State<Arc<ResourceRouter>>,
    ctx: RequestContext,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Reply, AppError> {
    router.list(&ctx, &params).await
}

pub async fn read(
    State(router): State<Arc<ResourceRouter>>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Reply, AppError> {
    router.get(&ctx, &id).await
}

pub async fn create(
    State(router): State<Arc<ResourceRouter>>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<Reply, AppError> {
    let body = parse_body(&body)?;
    router.create(&ctx, body).await
}

pub async fn update(
    State(router): State<Arc<ResourceRouter>>,
    ctx: RequestContext,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Reply, AppError> {
    let body = parse_body(&body)?;
    router.update(&ctx, &id, body).await
}

pub async fn delete(
    State(router): State<Arc<ResourceRouter>>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Reply, AppError> {
    router.delete(&ctx, &id).await
}

pub async fn fallback(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn body_parsing() {
        assert_eq!(parse_body(b"{\"a\": 1}").unwrap(), json!({"a": 1}));
        assert_eq!(parse_body(b"  ").unwrap_err().kind(), ErrorKind::Validation);
        let err = parse_body(b"{\"a\": ").unwrap_err();
        assert!(err.record().message.starts_with("malformed JSON body"));
    }
}
