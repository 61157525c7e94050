//! Shared application state: every mounted resource router.

use crate::service::ResourceRouter;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AppState {
    resources: Arc<Vec<Arc<ResourceRouter>>>,
}

impl AppState {
    pub fn new(resources: Vec<ResourceRouter>) -> Self {
        AppState {
            resources: Arc::new(resources.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn resources(&self) -> &[Arc<ResourceRouter>] {
        &self.resources
    }
}
