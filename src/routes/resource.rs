//! Per-resource routes: `/{base}` and `/{base}/:id`.

use crate::handlers::resource::{create, delete, list, read, update};
use crate::service::ResourceRouter;
use axum::{routing::get, Router};
use std::sync::Arc;

pub fn resource_routes(router: Arc<ResourceRouter>) -> Router {
    let base = format!("/{}", router.descriptor().path_segment);
    let item = format!("{}/:id", base);
    Router::new()
        .route(&base, get(list).post(create))
        .route(&item, get(read).patch(update).delete(delete))
        .with_state(router)
}
