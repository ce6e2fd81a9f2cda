//! Single-handler-per-pattern registry.
//!
//! Used for endpoints that have no method dimension: background tasks and
//! websocket routes.

use std::sync::Arc;

use crate::error::RouteError;
use crate::routing::router::PatternRouter;
use crate::routing::vars::PathVars;

/// Handlers of type `H` keyed by path pattern.
pub struct HandlerRegistry<H: ?Sized> {
    router: PatternRouter<Option<Arc<H>>>,
    /// Reported as the method in duplicate-registration errors.
    kind: &'static str,
}

impl<H: ?Sized> HandlerRegistry<H> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            router: PatternRouter::new(),
            kind,
        }
    }

    /// Register `handler` for `pattern`. Each pattern takes one handler.
    pub fn register(&mut self, pattern: &str, handler: Arc<H>) -> Result<(), RouteError> {
        let slot = self.router.insert(pattern)?;
        if slot.is_some() {
            return Err(RouteError::DuplicateHandler {
                pattern: pattern.to_string(),
                method: self.kind.to_string(),
            });
        }
        *slot = Some(handler);
        Ok(())
    }

    /// Handler for `path`, with its captured variables pushed into `vars`.
    pub fn lookup(&self, path: &str, vars: &mut PathVars) -> Option<Arc<H>> {
        self.router
            .match_path(path, vars)
            .and_then(|found| found.endpoint.clone())
    }

    /// Registered handlers with their patterns, in registration order.
    pub fn handlers(&self) -> impl Iterator<Item = (&str, &Arc<H>)> {
        self.router
            .endpoints()
            .filter_map(|(pattern, handler)| Some((pattern.as_str(), handler.as_ref()?)))
    }

    pub fn len(&self) -> usize {
        self.router.len()
    }

    pub fn is_empty(&self) -> bool {
        self.router.is_empty()
    }
}
