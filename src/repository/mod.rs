//! Storage capability consumed by the resource router.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PgRepository;

use crate::query::{Filter, Query};
use crate::schema::Payload;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    /// A uniqueness or state constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage: {0}")]
    Backend(String),
}

/// One page of matches plus the total number of matches before pagination.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindResult {
    pub items: Vec<Value>,
    pub total: u64,
}

/// Data access for one resource. Absence is `None`/`false`, never an error.
///
/// The by-id operations take `scope`: conjunctive filters the entity must also match. An entity
/// outside the scope is reported as absent.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find(&self, query: &Query) -> Result<FindResult, RepositoryError>;

    async fn find_one(&self, id: &Value, scope: &[Filter]) -> Result<Option<Value>, RepositoryError>;

    /// Store a new entity and return it as stored (generated id and timestamps included).
    async fn insert(&self, payload: Payload) -> Result<Value, RepositoryError>;

    /// Apply a partial update. `None` when no entity in scope has this id.
    async fn update(&self, id: &Value, scope: &[Filter], payload: Payload) -> Result<Option<Value>, RepositoryError>;

    async fn delete(&self, id: &Value, scope: &[Filter]) -> Result<bool, RepositoryError>;

    /// Readiness check.
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
