//! Typed errors and the error-kind taxonomy shared by every layer.

use crate::query::CompileError;
use crate::repository::RepositoryError;
use crate::schema::SchemaError;
use crate::exception::ExceptionMapper;
use crate::response::Envelope;
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid id field: resource {resource} field {field}")]
    InvalidPrimaryKey { resource: String, field: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Error kinds understood by the exception mapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema or query-compile rejection; client-fixable.
    Validation,
    NotFound,
    /// Uniqueness or state conflict reported by the repository.
    Conflict,
    /// Data-access failure not attributable to client input.
    Storage,
    Internal,
    /// A required request pre-condition (header, credential) is missing.
    Unauthorized,
    /// The operation is disabled for the resource.
    Forbidden,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(kind, message, details)` produced wherever a contract is violated; consumed only by the exception mapper.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ErrorRecord {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("validation: {message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Compile(_) | AppError::Schema(_) | AppError::Validation { .. } => ErrorKind::Validation,
            AppError::Repository(RepositoryError::Conflict(_)) => ErrorKind::Conflict,
            AppError::Repository(RepositoryError::Backend(_)) => ErrorKind::Storage,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }

    pub fn record(&self) -> ErrorRecord {
        let details = match self {
            AppError::Compile(e) => Some(e.details()),
            AppError::Schema(e) => Some(e.details()),
            AppError::Validation { details, .. } => details.clone(),
            _ => None,
        };
        let message = match self {
            AppError::Compile(e) => e.to_string(),
            AppError::Schema(e) => e.to_string(),
            AppError::Validation { message, .. } => message.clone(),
            AppError::NotFound(m) | AppError::Unauthorized(m) | AppError::Forbidden(m) => m.clone(),
            other => other.to_string(),
        };
        ErrorRecord {
            kind: self.kind(),
            message,
            details,
        }
    }
}

/// Rendered with the default exception table. The record travels in the response extensions so
/// the request middleware can re-map it with its own table.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let record = self.record();
        let (status, payload) = ExceptionMapper::default().map(&record);
        let mut res = (status, Json(Envelope::failure(payload))).into_response();
        res.extensions_mut().insert(record);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_errors_split_into_conflict_and_storage() {
        let conflict = AppError::from(RepositoryError::Conflict("email taken".into()));
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        let backend = AppError::from(RepositoryError::Backend("connection reset".into()));
        assert_eq!(backend.record().kind, ErrorKind::Storage);
    }

    #[test]
    fn compile_errors_are_validation_with_details() {
        let err = AppError::from(CompileError::UnknownField {
            field: "unknownField".into(),
        });
        let record = err.record();
        assert_eq!(record.kind, ErrorKind::Validation);
        assert!(record.message.contains("unknownField"));
        assert_eq!(record.details.unwrap()["field"], "unknownField");
    }

    #[test]
    fn into_response_carries_the_record() {
        let res = AppError::NotFound("users 7 not found".into()).into_response();
        assert_eq!(res.status(), axum::http::StatusCode::NOT_FOUND);
        let record = res.extensions().get::<ErrorRecord>().unwrap();
        assert_eq!(record.kind, ErrorKind::NotFound);
        assert_eq!(record.message, "users 7 not found");
    }
}
