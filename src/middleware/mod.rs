//! Request middleware: correlation id, pre-checks, deadline, and finalization of every response
//! into the standard envelope.

pub mod checks;
pub mod context;

pub use checks::{PreCheck, RequireBearer, RequireHeader};
pub use context::{RequestContext, PRINCIPAL_HEADER, REQUEST_ID_HEADER};

use crate::config::Settings;
use crate::error::{ErrorKind, ErrorRecord};
use crate::exception::ExceptionMapper;
use crate::response::{Envelope, ErrorPayload, PendingEnvelope};
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const RESPONSE_TIME_HEADER: &str = "x-response-time-ms";

#[derive(Clone)]
pub struct MiddlewareState {
    mapper: Arc<ExceptionMapper>,
    pre_checks: Arc<Vec<Arc<dyn PreCheck>>>,
    timeout: Option<Duration>,
}

impl Default for MiddlewareState {
    fn default() -> Self {
        MiddlewareState::new(ExceptionMapper::default())
    }
}

impl MiddlewareState {
    pub fn new(mapper: ExceptionMapper) -> Self {
        MiddlewareState {
            mapper: Arc::new(mapper),
            pre_checks: Arc::new(Vec::new()),
            timeout: None,
        }
    }

    /// Required headers, bearer requirement and deadline from process settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut state = MiddlewareState::default().with_timeout(settings.request_timeout);
        for header in &settings.required_headers {
            state = state.with_check(RequireHeader::new(header.as_str()));
        }
        if settings.require_bearer {
            state = state.with_check(RequireBearer);
        }
        state
    }

    /// Checks run in insertion order; the first failure wins.
    pub fn with_check(mut self, check: impl PreCheck + 'static) -> Self {
        Arc::make_mut(&mut self.pre_checks).push(Arc::new(check));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Kind for an error response that did not come from a handler (router fallback, rejection,
/// body limit).
fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
        StatusCode::FORBIDDEN => ErrorKind::Forbidden,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        s if s.is_client_error() => ErrorKind::Validation,
        _ => ErrorKind::Internal,
    }
}

fn envelope_json(status: StatusCode, envelope: &Envelope) -> Response {
    (status, Json(envelope)).into_response()
}

fn error_envelope(status: StatusCode, payload: ErrorPayload, ctx: &RequestContext) -> Response {
    let mut envelope = Envelope::failure(payload);
    envelope.set_request_id(ctx.request_id.as_str());
    envelope_json(status, &envelope)
}

fn render_error(mapper: &ExceptionMapper, ctx: &RequestContext, record: &ErrorRecord) -> Response {
    let (status, payload) = mapper.map(record);
    if status.is_server_error() {
        tracing::error!(
            request_id = %ctx.request_id,
            kind = %record.kind,
            message = %record.message,
            "request failed"
        );
    }
    error_envelope(status, payload, ctx)
}

/// Turn whatever the inner service produced into exactly one envelope response.
fn finalize(mapper: &ExceptionMapper, ctx: &RequestContext, mut res: Response) -> Response {
    if let Some(record) = res.extensions_mut().remove::<ErrorRecord>() {
        return render_error(mapper, ctx, &record);
    }
    if let Some(PendingEnvelope(mut envelope)) = res.extensions_mut().remove::<PendingEnvelope>() {
        envelope.set_request_id(ctx.request_id.as_str());
        return envelope_json(res.status(), &envelope);
    }
    let status = res.status();
    if status.is_client_error() || status.is_server_error() {
        // Keep the status; only the body is normalized.
        let reason = status.canonical_reason().unwrap_or("request failed");
        let record = ErrorRecord::new(kind_for_status(status), reason.to_ascii_lowercase());
        let (_, payload) = mapper.map(&record);
        return error_envelope(status, payload, ctx);
    }
    res
}

/// Wraps every request. Use with `axum::middleware::from_fn_with_state`.
pub async fn request_pipeline(State(state): State<MiddlewareState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let ctx = RequestContext::from_headers(req.headers());

    let (mut parts, body) = req.into_parts();
    parts.extensions.insert(ctx.clone());
    let failed_check = state.pre_checks.iter().find_map(|c| c.check(&parts).err());

    let mut res = match failed_check {
        Some(record) => {
            tracing::debug!(request_id = %ctx.request_id, message = %record.message, "pre-check failed");
            render_error(&state.mapper, &ctx, &record)
        }
        None => {
            let run = next.run(Request::from_parts(parts, body));
            let outcome = match state.timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| limit),
                None => Ok(run.await),
            };
            match outcome {
                Ok(res) => finalize(&state.mapper, &ctx, res),
                Err(limit) => {
                    let record = ErrorRecord::new(
                        ErrorKind::Storage,
                        format!("request exceeded deadline of {} ms", limit.as_millis()),
                    );
                    render_error(&state.mapper, &ctx, &record)
                }
            }
        }
    };

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let headers = res.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&ctx.request_id) {
        headers.insert(REQUEST_ID_HEADER, v);
    }
    headers.insert(RESPONSE_TIME_HEADER, HeaderValue::from(elapsed_ms));

    let status = res.status();
    if status.is_server_error() {
        tracing::error!(%method, %path, status = status.as_u16(), request_id = %ctx.request_id, elapsed_ms, "request completed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %path, status = status.as_u16(), request_id = %ctx.request_id, elapsed_ms, "request completed");
    } else {
        tracing::info!(%method, %path, status = status.as_u16(), request_id = %ctx.request_id, elapsed_ms, "request completed");
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::response::Reply;
    use axum::{body::Body, routing::get, Router};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: Router, req: axum::http::Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    fn app(state: MiddlewareState) -> Router {
        Router::new()
            .route("/ok", get(|| async { Reply::ok(json!({"pong": true})) }))
            .route("/missing", get(|| async { AppError::NotFound("nothing here".into()) }))
            .route("/plain", get(|| async { (StatusCode::METHOD_NOT_ALLOWED, "nope") }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Reply::ok(Value::Null)
                }),
            )
            .layer(axum::middleware::from_fn_with_state(state, request_pipeline))
    }

    fn get_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn success_gets_request_id_in_meta_and_headers() {
        let req = axum::http::Request::get("/ok")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = call(app(MiddlewareState::default()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["request_id"], "abc-123");
        assert_eq!(body["data"]["pong"], true);
        assert!(body["error"].is_null());
        assert_eq!(headers[REQUEST_ID_HEADER], "abc-123");
        assert!(headers.contains_key(RESPONSE_TIME_HEADER));
    }

    #[tokio::test]
    async fn custom_mapper_applies_to_handler_errors() {
        let mapper = ExceptionMapper::default().with_status(ErrorKind::NotFound, StatusCode::GONE);
        let (status, _, body) = call(app(MiddlewareState::new(mapper)), get_req("/missing")).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["error"]["kind"], "not_found");
        assert_eq!(body["error"]["message"], "nothing here");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn stray_error_responses_are_wrapped() {
        let (status, _, body) = call(app(MiddlewareState::default()), get_req("/plain")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"]["kind"], "validation");

        let (status, _, body) = call(app(MiddlewareState::default()), get_req("/nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn failed_pre_check_short_circuits() {
        let state = MiddlewareState::default().with_check(RequireHeader::new("x-tenant-id"));
        let (status, _, body) = call(app(state), get_req("/ok")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["kind"], "unauthorized");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn deadline_maps_to_storage() {
        let state = MiddlewareState::default().with_timeout(Some(Duration::from_millis(20)));
        let (status, _, body) = call(app(state), get_req("/slow")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["kind"], "storage");
    }
}
