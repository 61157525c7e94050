//! Composition root: resource routers, common routes and the layer stack on one axum router.

use crate::config::{ModelDescriptor, Settings};
use crate::error::{ConfigError, ErrorKind, ErrorRecord};
use crate::handlers::fallback;
use crate::middleware::{request_pipeline, MiddlewareState};
use crate::repository::Repository;
use crate::routes::{common_routes, resource_routes};
use crate::schema::RuleSchema;
use crate::service::ResourceRouter;
use crate::state::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer};

/// One router per descriptor, each with a [`RuleSchema`] and the repository `repository_for`
/// returns for it.
pub fn resource_routers(
    descriptors: Vec<ModelDescriptor>,
    mut repository_for: impl FnMut(Arc<ModelDescriptor>) -> Arc<dyn Repository>,
) -> Result<Vec<ResourceRouter>, ConfigError> {
    descriptors
        .into_iter()
        .map(|d| {
            let descriptor = Arc::new(d);
            let schema = Arc::new(RuleSchema::new(descriptor.clone())?);
            let repository = repository_for(descriptor.clone());
            Ok(ResourceRouter::new(descriptor, schema, repository))
        })
        .collect()
}

/// A panic inside a handler becomes an internal error; the middleware renders the envelope.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    let mut res = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    res.extensions_mut()
        .insert(ErrorRecord::new(ErrorKind::Internal, format!("handler panicked: {}", detail)));
    res
}

/// Mount every resource plus `/health`, `/ready`, `/version`. Layers from the inside out: body
/// limit, panic catching, request middleware.
pub fn build_app(state: AppState, middleware: MiddlewareState, body_limit_bytes: usize) -> Router {
    let mut app = common_routes(state.clone());
    for resource in state.resources() {
        app = app.merge(resource_routes(resource.clone()));
    }
    app.fallback(fallback)
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum::middleware::from_fn_with_state(middleware, request_pipeline))
}

/// [`build_app`] with the middleware and body limit taken from process settings.
pub fn build_app_from_settings(state: AppState, settings: &Settings) -> Router {
    build_app(state, MiddlewareState::from_settings(settings), settings.body_limit_bytes)
}
