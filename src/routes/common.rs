//! Common routes: health, readiness, version.

use crate::error::AppError;
use crate::response::Reply;
use crate::state::AppState;
use axum::{extract::State, routing::get, Router};
use serde_json::json;

async fn health() -> Reply {
    Reply::ok(json!({ "status": "ok" }))
}

/// Pings every resource's repository; the first failure answers 503 (storage).
async fn ready(State(state): State<AppState>) -> Result<Reply, AppError> {
    for resource in state.resources() {
        resource.repository().ping().await?;
    }
    Ok(Reply::ok(json!({ "status": "ok", "resources": state.resources().len() })))
}

async fn version() -> Reply {
    Reply::ok(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /ready, GET /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
