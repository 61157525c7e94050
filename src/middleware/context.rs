//! Per-request context: correlation id and calling principal.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const PRINCIPAL_HEADER: &str = "x-user-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Set by the request middleware; handlers read it through the extractor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub principal: Option<String>,
}

impl RequestContext {
    /// Incoming `x-request-id` when it is printable ASCII of sane length, otherwise a fresh v4 UUID.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let request_id = header_value(headers, REQUEST_ID_HEADER)
            .filter(|s| s.len() <= MAX_REQUEST_ID_LEN && s.chars().all(|c| c.is_ascii_graphic()))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        RequestContext {
            request_id,
            principal: header_value(headers, PRINCIPAL_HEADER),
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext::from_headers(&parts.headers)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn keeps_sane_incoming_id_and_principal() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-42"));
        headers.insert(PRINCIPAL_HEADER, HeaderValue::from_static(" u-7 "));
        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.request_id, "req-42");
        assert_eq!(ctx.principal.as_deref(), Some("u-7"));
    }

    #[test]
    fn replaces_missing_or_oversized_id() {
        let ctx = RequestContext::from_headers(&HeaderMap::new());
        assert!(uuid::Uuid::parse_str(&ctx.request_id).is_ok());
        assert!(ctx.principal.is_none());

        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(&"x".repeat(200)).unwrap());
        assert_ne!(RequestContext::from_headers(&headers).request_id.len(), 200);
    }
}
