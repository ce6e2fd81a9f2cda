//! Error types shared across subsystems.
//!
//! # Design Decisions
//! - One enum per concern, composed into `ServerError` at the startup boundary
//! - Configuration-time errors are fatal; request-time errors map to statuses
//! - `ComponentError` is `Clone` so a failed component re-reports its failure

use std::sync::Arc;

use hyper::StatusCode;
use thiserror::Error;

use crate::config::loader::ConfigError;

/// Boxed error returned by user init routines.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Request-time dispatch failures, surfaced as HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestError {
    /// No registered pattern matches the path.
    #[error("route not found")]
    RouteNotFound,

    /// A pattern matched but has no handler for the request method.
    #[error("method not supported")]
    MethodNotSupported,
}

impl RequestError {
    /// HTTP status reported for this failure.
    pub fn status(self) -> StatusCode {
        match self {
            RequestError::RouteNotFound => StatusCode::NOT_FOUND,
            RequestError::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

/// Route registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    /// Same static structure as an existing route but different variable names.
    #[error("pattern {pattern:?} conflicts with registered route {existing:?}")]
    ConflictingRoute { pattern: String, existing: String },

    #[error("handler for {method} {pattern:?} is already registered")]
    DuplicateHandler { pattern: String, method: String },
}

/// Component resolution failures.
#[derive(Debug, Clone, Error)]
pub enum ComponentError {
    #[error("component {0:?} is not found")]
    NotFound(String),

    /// Initialization re-entered a component that was still initializing.
    #[error("cyclic dependency detected at component {0:?}")]
    CyclicDependency(String),

    #[error("component {name:?} failed to initialize: {source}")]
    InitializationFailure {
        name: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("component {0:?} is not of the requested type")]
    TypeMismatch(String),
}

impl ComponentError {
    /// Name of the component the error is about.
    pub fn name(&self) -> &str {
        match self {
            ComponentError::NotFound(name)
            | ComponentError::CyclicDependency(name)
            | ComponentError::TypeMismatch(name) => name,
            ComponentError::InitializationFailure { name, .. } => name,
        }
    }
}

/// Background task dispatch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("no task handler found for {0:?}")]
    NotFound(String),
}

/// Stage of the startup sequence, reported with init failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    Components,
    GlobalFilters,
    Routes,
    Tasks,
    WebSockets,
    InitFuncs,
}

impl std::fmt::Display for StartupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StartupStage::Components => "components",
            StartupStage::GlobalFilters => "global filters",
            StartupStage::Routes => "routes",
            StartupStage::Tasks => "task handlers",
            StartupStage::WebSockets => "websocket handlers",
            StartupStage::InitFuncs => "init funcs",
        };
        f.write_str(name)
    }
}

/// Top-level server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("startup failed while initializing {stage} ({name}): {source}")]
    Startup {
        stage: StartupStage,
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_distinct_statuses() {
        assert_eq!(RequestError::RouteNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            RequestError::MethodNotSupported.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn component_error_reports_name() {
        let err = ComponentError::CyclicDependency("cache".into());
        assert_eq!(err.name(), "cache");
        assert!(err.to_string().contains("cyclic"));
    }
}
