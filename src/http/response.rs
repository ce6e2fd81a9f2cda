//! Buffered HTTP responses.
//!
//! # Design Decisions
//! - Bodies are fully buffered (`Bytes`); streaming is out of scope
//! - The configured default content type is applied on the way out, only
//!   when the handler set none and the body is non-empty

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, IntoHeaderName, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::codec::{encode_as, Codec, CodecError};

/// A complete HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl Response {
    /// Empty response with `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Response whose body is the canonical reason phrase of `status`.
    pub fn status_page(status: StatusCode) -> Self {
        Self::new(status).with_body(status.canonical_reason().unwrap_or_default())
    }

    /// `text/plain` response.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    /// JSON response. Serialization failure yields a 500.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "application/json")
                .with_body(body),
            Err(e) => {
                warn!(error = %e, "Failed to serialize JSON response");
                Self::status_page(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Response encoded with `codec`, carrying its content type.
    pub fn encoded<T: Serialize>(codec: &dyn Codec, value: &T) -> Result<Self, CodecError> {
        let body = encode_as(codec, value)?;
        Ok(Self::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, codec.content_type())
            .with_body(body))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set a header. Invalid values are dropped with a warning.
    pub fn with_header(mut self, name: impl IntoHeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!(value, "Dropping invalid response header value"),
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Convert for hyper, applying `default_content_type` if needed.
    pub(crate) fn into_hyper(
        self,
        default_content_type: Option<&HeaderValue>,
    ) -> hyper::Response<Full<Bytes>> {
        let mut headers = self.headers;
        if let Some(content_type) = default_content_type {
            if !self.body.is_empty() && !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, content_type.clone());
            }
        }

        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}
