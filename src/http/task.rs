//! Background tasks addressed by path.
//!
//! Task handlers register under route patterns, like HTTP handlers, and are
//! started with [`Environment::start_task`](crate::Environment::start_task).
//! The value passed along is opaque; handlers downcast it.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::{BoxError, TaskError};
use crate::http::handler::BoxFuture;
use crate::routing::{HandlerRegistry, PathVars};

/// Opaque payload handed to a task.
pub type TaskValue = Box<dyn Any + Send>;

/// Handler for background tasks.
pub trait TaskHandler: Send + Sync {
    fn init(&self, _env: &dyn Environment) -> Result<(), BoxError> {
        Ok(())
    }

    fn run<'a>(&'a self, env: &'a dyn Environment, value: TaskValue) -> BoxFuture<'a, ()>;

    fn destroy(&self) {}
}

/// Task handler built from an async closure. See [`task_fn`].
pub struct TaskFn<F> {
    f: F,
}

/// Wrap an async closure as a [`TaskHandler`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: Fn(TaskValue) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    TaskFn { f }
}

impl<F, Fut> TaskHandler for TaskFn<F>
where
    F: Fn(TaskValue) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn run<'a>(&'a self, _env: &'a dyn Environment, value: TaskValue) -> BoxFuture<'a, ()> {
        Box::pin((self.f)(value))
    }
}

/// Task handlers keyed by path pattern.
pub type TaskRegistry = HandlerRegistry<dyn TaskHandler>;

impl HandlerRegistry<dyn TaskHandler> {
    /// Task handler for `path`.
    pub fn task(&self, path: &str) -> Result<Arc<dyn TaskHandler>, TaskError> {
        self.lookup(path, &mut PathVars::new())
            .ok_or_else(|| TaskError::NotFound(path.to_string()))
    }
}

impl Default for HandlerRegistry<dyn TaskHandler> {
    fn default() -> Self {
        Self::new("TASK")
    }
}
