//! HTTP route endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use hyper::Method;

use crate::filter::Filter;
use crate::http::handler::Handler;

/// Per-method handlers and route-scoped filters for one pattern.
#[derive(Default)]
pub struct Route {
    handlers: HashMap<Method, Arc<dyn Handler>>,
    filters: Vec<Arc<dyn Filter>>,
}

impl Route {
    /// Attach `handler` for `method`. Returns `false` if one is already set.
    pub(crate) fn add_handler(&mut self, method: Method, handler: Arc<dyn Handler>) -> bool {
        if self.handlers.contains_key(&method) {
            return false;
        }
        self.handlers.insert(method, handler);
        true
    }

    pub(crate) fn add_filters(&mut self, filters: impl IntoIterator<Item = Arc<dyn Filter>>) {
        self.filters.extend(filters);
    }

    pub fn handler(&self, method: &Method) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(method)
    }

    /// Route-scoped filters, outermost first.
    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.handlers.keys()
    }

    pub(crate) fn handlers(&self) -> impl Iterator<Item = &Arc<dyn Handler>> {
        self.handlers.values()
    }
}
