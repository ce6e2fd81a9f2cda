//! Built-in filters.

use std::time::Instant;

use hyper::header::HeaderValue;
use tracing::info;
use uuid::Uuid;

use crate::filter::{Filter, Next};
use crate::http::handler::BoxFuture;
use crate::http::request::{Request, X_REQUEST_ID};
use crate::http::response::Response;

/// Ensures every request carries an `x-request-id` and echoes it back.
///
/// An incoming ID is kept; otherwise a UUID v4 is generated. The ID is set
/// on the response unless the handler already set one.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestIdFilter;

impl Filter for RequestIdFilter {
    fn call<'a>(&'a self, mut req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let id = match req.headers().get(X_REQUEST_ID) {
                Some(id) => id.clone(),
                None => {
                    let id = HeaderValue::from_str(&Uuid::new_v4().to_string())
                        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
                    req.headers_mut().insert(X_REQUEST_ID, id.clone());
                    id
                }
            };

            let mut response = next.run(req).await;
            response.headers_mut().entry(X_REQUEST_ID).or_insert(id);
            response
        })
    }
}

/// Logs one line per request with method, path, status and latency.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessLogFilter;

impl Filter for AccessLogFilter {
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().clone();
            let path = req.path().to_string();
            let request_id = req.request_id().unwrap_or("-").to_string();

            let response = next.run(req).await;

            info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                latency_ms = start.elapsed().as_millis() as u64,
                "Request served"
            );
            response
        })
    }
}
