//! Error-kind to HTTP status translation.

use crate::error::{ErrorKind, ErrorRecord};
use crate::response::ErrorPayload;
use axum::http::StatusCode;
use std::collections::HashMap;

const GENERIC_STORAGE_MESSAGE: &str = "the data store is unavailable, try again later";
const GENERIC_INTERNAL_MESSAGE: &str = "internal server error";

/// Table from [`ErrorKind`] to status code. Kinds missing from the table are treated as
/// `internal` (500).
#[derive(Clone, Debug)]
pub struct ExceptionMapper {
    table: HashMap<ErrorKind, StatusCode>,
}

impl Default for ExceptionMapper {
    fn default() -> Self {
        ExceptionMapper::empty()
            .with_status(ErrorKind::Validation, StatusCode::UNPROCESSABLE_ENTITY)
            .with_status(ErrorKind::NotFound, StatusCode::NOT_FOUND)
            .with_status(ErrorKind::Conflict, StatusCode::CONFLICT)
            .with_status(ErrorKind::Storage, StatusCode::SERVICE_UNAVAILABLE)
            .with_status(ErrorKind::Internal, StatusCode::INTERNAL_SERVER_ERROR)
            .with_status(ErrorKind::Unauthorized, StatusCode::UNAUTHORIZED)
            .with_status(ErrorKind::Forbidden, StatusCode::FORBIDDEN)
    }
}

impl ExceptionMapper {
    pub fn empty() -> Self {
        ExceptionMapper { table: HashMap::new() }
    }

    pub fn with_status(mut self, kind: ErrorKind, status: StatusCode) -> Self {
        self.table.insert(kind, status);
        self
    }

    pub fn without(mut self, kind: ErrorKind) -> Self {
        self.table.remove(&kind);
        self
    }

    /// Map a record to its status and public payload. Storage and internal messages and details
    /// never reach the client.
    pub fn map(&self, record: &ErrorRecord) -> (StatusCode, ErrorPayload) {
        let (kind, status) = match self.table.get(&record.kind) {
            Some(status) => (record.kind, *status),
            None => (ErrorKind::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        };
        let payload = match kind {
            ErrorKind::Storage => ErrorPayload {
                kind,
                message: GENERIC_STORAGE_MESSAGE.to_string(),
                details: None,
            },
            ErrorKind::Internal => ErrorPayload {
                kind,
                message: GENERIC_INTERNAL_MESSAGE.to_string(),
                details: None,
            },
            _ => ErrorPayload {
                kind,
                message: record.message.clone(),
                details: record.details.clone(),
            },
        };
        (status, payload)
    }
}
