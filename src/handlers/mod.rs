//! HTTP handlers: thin adapters from axum extractors to the resource router.

pub mod resource;

pub use resource::fallback;
