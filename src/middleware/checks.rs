//! Pre-conditions evaluated before a request is routed.

use crate::error::{ErrorKind, ErrorRecord};
use axum::http::{header::AUTHORIZATION, request::Parts};

/// A failing check short-circuits the request with its error record; the handler never runs.
pub trait PreCheck: Send + Sync {
    fn check(&self, parts: &Parts) -> Result<(), ErrorRecord>;
}

/// Require a non-empty header (e.g. a tenant or app id).
pub struct RequireHeader {
    name: String,
}

impl RequireHeader {
    pub fn new(name: impl Into<String>) -> Self {
        RequireHeader {
            name: name.into().to_ascii_lowercase(),
        }
    }
}

impl PreCheck for RequireHeader {
    fn check(&self, parts: &Parts) -> Result<(), ErrorRecord> {
        let present = parts
            .headers
            .get(self.name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if present {
            Ok(())
        } else {
            Err(ErrorRecord::new(ErrorKind::Unauthorized, format!("missing required header {}", self.name))
                .with_details(serde_json::json!({ "header": self.name })))
        }
    }
}

/// Require an `Authorization: Bearer <token>` header. Token verification is left to the application.
pub struct RequireBearer;

impl PreCheck for RequireBearer {
    fn check(&self, parts: &Parts) -> Result<(), ErrorRecord> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .unwrap_or("");
        if token.is_empty() {
            Err(ErrorRecord::new(ErrorKind::Unauthorized, "missing bearer token"))
        } else {
            Ok(())
        }
    }
}
