//! Named, lazily initialized application components.
//!
//! # Data Flow
//! ```text
//! register (builder) → Registered
//! resolve(name) → Initializing → init(env) → Initialized | Failed
//! server start → init_eager (registration order)
//! server stop → destroy (reverse completed-init order)
//! ```
//!
//! # Design Decisions
//! - A component's `init` may resolve other components; a re-entrant visit
//!   to a component still initializing is a cycle
//! - Failures are sticky: later resolves report the same error
//! - Teardown touches only components whose init completed

use std::any::Any;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::BoxError;

pub mod manager;

pub use manager::{Activation, ComponentManager, ComponentStatus};

/// Upcast to `Any` so resolved components can be downcast to their type.
pub trait AsAny: Any + Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A shared application service with an init and teardown hook.
pub trait Component: AsAny {
    /// Called once, on first resolve or at startup for eager components.
    fn init(&self, _env: &dyn Environment) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called once at shutdown if `init` completed.
    fn destroy(&self) {}
}
