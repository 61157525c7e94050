//! Resource kit: declare a resource once, get list/get/create/update/delete endpoints with
//! filtering, sorting, search, pagination, validation and uniform error envelopes.

pub mod app;
pub mod config;
pub mod error;
pub mod exception;
pub mod handlers;
pub mod middleware;
pub mod query;
pub mod repository;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod state;

pub use app::{build_app, build_app_from_settings, resource_routers};
pub use config::{load_from_path, resolve, resolve_all, ModelDescriptor, PageSettings, Settings};
pub use error::{AppError, ConfigError, ErrorKind, ErrorRecord};
pub use exception::ExceptionMapper;
pub use middleware::{MiddlewareState, PreCheck, RequestContext, RequireBearer, RequireHeader};
pub use query::{CompileError, Query, QueryCompiler};
pub use repository::{FindResult, InMemoryRepository, PgRepository, Repository, RepositoryError};
pub use response::{Envelope, Meta, Reply};
pub use schema::{Payload, RuleSchema, Schema, SchemaError, ValidationMode};
pub use service::{NoHooks, OwnerScope, ResourceHooks, ResourceRouter};
pub use state::AppState;
