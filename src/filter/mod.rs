//! Request filters.
//!
//! # Data Flow
//! ```text
//! request
//!     → global filters (registration order, outermost)
//!     → route filters (registration order)
//!     → terminal (route handler, or a 404/405 status)
//! ```
//!
//! # Design Decisions
//! - A filter receives the request and a `Next` handle; not calling
//!   `next.run` short-circuits the rest of the chain
//! - Chains are composed per request over a pooled link vector, no boxing
//!   of intermediate closures
//! - Global filters still run when no route matched

use crate::environment::Environment;
use crate::error::BoxError;
use crate::http::handler::BoxFuture;
use crate::http::request::Request;
use crate::http::response::Response;

pub mod builtin;
pub mod chain;

pub use builtin::{AccessLogFilter, RequestIdFilter};
pub use chain::{FilterChain, Next, Terminal};

/// A pre/post-processing step around the rest of the chain.
///
/// # Example
///
/// ```ignore
/// struct Deny;
///
/// impl Filter for Deny {
///     fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
///         Box::pin(async move {
///             if req.header("authorization").is_none() {
///                 return Response::status_page(StatusCode::UNAUTHORIZED);
///             }
///             next.run(req).await
///         })
///     }
/// }
/// ```
pub trait Filter: Send + Sync {
    /// Called once at startup. Global filters initialize before routes.
    fn init(&self, _env: &dyn Environment) -> Result<(), BoxError> {
        Ok(())
    }

    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response>;

    /// Called once at shutdown.
    fn destroy(&self) {}
}
