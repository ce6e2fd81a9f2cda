//! Incoming requests as seen by filters and handlers.
//!
//! # Responsibilities
//! - Carry method, URI, headers and the buffered body
//! - Expose captured path variables (pooled, returned on drop)
//! - Give handlers the environment and connection hijacking
//!
//! # Design Decisions
//! - Owned and `'static`, so handlers may move it into spawned tasks
//! - Hijacking takes the hyper upgrade handle; the connection then leaves
//!   shutdown tracking

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::http::Extensions;
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;

use crate::codec::{decode_as, CodecError};
use crate::environment::Env;
use crate::pool::Pooled;
use crate::routing::PathVars;

/// Request header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// A buffered HTTP request.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    vars: Pooled<PathVars>,
    remote_addr: Option<SocketAddr>,
    extensions: Extensions,
    env: Env,
    hijacked: Arc<AtomicBool>,
}

impl Request {
    /// Build a request outside a connection, e.g. in tests.
    pub fn new(method: Method, uri: Uri, env: Env) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            vars: Pooled::detached(PathVars::new()),
            remote_addr: None,
            extensions: Extensions::new(),
            env,
            hijacked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn from_parts(
        parts: hyper::http::request::Parts,
        body: Bytes,
        vars: Pooled<PathVars>,
        remote_addr: SocketAddr,
        env: Env,
        hijacked: Arc<AtomicBool>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            vars,
            remote_addr: Some(remote_addr),
            extensions: parts.extensions,
            env,
            hijacked,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_vars(mut self, vars: PathVars) -> Self {
        self.vars = Pooled::detached(vars);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Variables captured by the matched route pattern.
    pub fn vars(&self) -> &PathVars {
        &self.vars
    }

    /// Shorthand for `vars().get(name)`.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Request ID assigned by [`RequestIdFilter`](crate::filter::RequestIdFilter).
    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID)
    }

    /// Decode the body with the codec for the request's content type,
    /// falling back to the default codec when none is given.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        let codec = match self.content_type() {
            Some(content_type) => self
                .env
                .codec(content_type)
                .ok_or_else(|| CodecError::Unsupported(content_type.to_string()))?,
            None => self.env.default_codec(),
        };
        decode_as(&*codec, &self.body)
    }

    /// Take over the connection.
    ///
    /// Returns the upgrade handle, which resolves once the handler's response
    /// has been written. From then on the server no longer waits for this
    /// connection at shutdown. Returns `None` if the request was not received
    /// on an upgradable connection or was already hijacked.
    pub fn hijack(&mut self) -> Option<OnUpgrade> {
        let upgrade = self.extensions.remove::<OnUpgrade>()?;
        self.hijacked.store(true, Ordering::Release);
        Some(upgrade)
    }

    /// Whether [`hijack`](Self::hijack) succeeded.
    pub fn is_hijacked(&self) -> bool {
        self.hijacked.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("vars", &self.vars)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}
