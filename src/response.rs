//! Standard response envelope: `{data, meta, error}`.

use crate::error::ErrorKind;
use crate::query::Page;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Offset of the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u64>,
}

impl Meta {
    pub fn page(total: u64, page: Page, count: u64) -> Self {
        let end = page.offset.saturating_add(count);
        Meta {
            request_id: None,
            total: Some(total),
            offset: Some(page.offset),
            limit: Some(page.limit),
            count: Some(count),
            next_offset: (count > 0 && end < total).then_some(end),
        }
    }
}

/// Public part of an error record, as rendered in the envelope.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

/// Exactly one of `data` and `error` is populated. All three keys are always serialized.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope {
    data: Value,
    meta: Meta,
    error: Option<ErrorPayload>,
}

impl Envelope {
    pub fn success(data: Value, meta: Meta) -> Self {
        Envelope { data, meta, error: None }
    }

    pub fn failure(error: ErrorPayload) -> Self {
        Envelope {
            data: Value::Null,
            meta: Meta::default(),
            error: Some(error),
        }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn error(&self) -> Option<&ErrorPayload> {
        self.error.as_ref()
    }

    pub fn set_request_id(&mut self, id: impl Into<String>) {
        self.meta.request_id = Some(id.into());
    }
}

/// Marks a response body as an envelope so the request middleware can finalize it.
#[derive(Clone, Debug)]
pub struct PendingEnvelope(pub Envelope);

/// A successful handler result: status plus envelope.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub envelope: Envelope,
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Reply {
            status: StatusCode::OK,
            envelope: Envelope::success(data, Meta::default()),
        }
    }

    pub fn created(data: Value) -> Self {
        Reply {
            status: StatusCode::CREATED,
            envelope: Envelope::success(data, Meta::default()),
        }
    }

    pub fn list(items: Vec<Value>, total: u64, page: Page) -> Self {
        let count = items.len() as u64;
        Reply {
            status: StatusCode::OK,
            envelope: Envelope::success(Value::Array(items), Meta::page(total, page, count)),
        }
    }
}

/// Render an envelope and tag the response so the middleware can re-render it with the request id.
pub fn envelope_response(status: StatusCode, envelope: Envelope) -> Response {
    let mut res = (status, Json(&envelope)).into_response();
    res.extensions_mut().insert(PendingEnvelope(envelope));
    res
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        envelope_response(self.status, self.envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_serializes_all_three_keys() {
        let env = Envelope::success(json!({"id": 1}), Meta::default());
        assert_eq!(serde_json::to_value(&env).unwrap(), json!({"data": {"id": 1}, "meta": {}, "error": null}));
    }

    #[test]
    fn list_meta_reports_next_offset_until_last_page() {
        let reply = Reply::list(vec![json!(1), json!(2)], 5, Page { offset: 2, limit: 2 });
        let meta = reply.envelope.meta();
        assert_eq!(meta.count, Some(2));
        assert_eq!(meta.next_offset, Some(4));

        let last = Reply::list(vec![json!(5)], 5, Page { offset: 4, limit: 2 });
        assert_eq!(last.envelope.meta().next_offset, None);
    }

    #[test]
    fn failure_has_null_data() {
        let env = Envelope::failure(ErrorPayload {
            kind: ErrorKind::NotFound,
            message: "gone".into(),
            details: None,
        });
        let v = serde_json::to_value(&env).unwrap();
        assert!(v["data"].is_null());
        assert_eq!(v["error"]["kind"], "not_found");
        assert!(v["error"]["details"].is_null());
    }
}
