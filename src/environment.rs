//! The capability handlers, filters and components use to reach the server.

use std::sync::Arc;

use tracing::Span;

use crate::codec::Codec;
use crate::component::Component;
use crate::error::ComponentError;
use crate::http::task::TaskValue;

/// Server facilities available to application code.
///
/// The server implements this; it is handed to `init` routines by reference
/// and travels with each request as an [`Env`].
pub trait Environment: Send + Sync {
    /// Resolve a named component, initializing it on first access.
    fn resolve(&self, name: &str) -> Result<Arc<dyn Component>, ComponentError>;

    /// Root span of the server. Enter it to log in server context.
    fn logger(&self) -> &Span;

    /// Fire a background task. Never waits for the task to finish.
    fn start_task(&self, path: &str, value: TaskValue);

    /// Codec registered for `content_type`.
    fn codec(&self, content_type: &str) -> Option<Arc<dyn Codec>>;

    /// Codec used when a request names no content type.
    fn default_codec(&self) -> Arc<dyn Codec>;
}

/// Shared handle to the environment.
pub type Env = Arc<dyn Environment>;

impl dyn Environment + '_ {
    /// Resolve a component and downcast it to its concrete type.
    pub fn resolve_as<T: Component>(&self, name: &str) -> Result<Arc<T>, ComponentError> {
        self.resolve(name)?
            .into_any()
            .downcast::<T>()
            .map_err(|_| ComponentError::TypeMismatch(name.to_string()))
    }
}
