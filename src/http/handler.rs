//! Request handlers.

use std::future::Future;
use std::pin::Pin;

use crate::environment::Environment;
use crate::error::BoxError;
use crate::http::request::Request;
use crate::http::response::Response;

/// Boxed future borrowed for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Terminal request handler bound to a route and method.
pub trait Handler: Send + Sync {
    /// Called once at startup, after components and global filters.
    fn init(&self, _env: &dyn Environment) -> Result<(), BoxError> {
        Ok(())
    }

    fn handle<'a>(&'a self, req: Request) -> BoxFuture<'a, Response>;

    /// Called once at shutdown.
    fn destroy(&self) {}
}

/// Handler built from an async closure. See [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`Handler`].
///
/// ```ignore
/// builder.get("/ping", handler_fn(|_req| async { Response::text("pong") }))?;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle<'a>(&'a self, req: Request) -> BoxFuture<'a, Response> {
        Box::pin((self.f)(req))
    }
}
