//! Switchyard: an embeddable HTTP application server.
//!
//! Routes requests by path pattern through per-request filter chains,
//! manages lazily initialized components, and shuts down gracefully by
//! draining tracked connections.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Application wiring
pub mod codec;
pub mod component;
pub mod environment;
pub mod filter;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod pool;

#[cfg(test)]
mod testing;

pub use codec::{Codec, CodecRegistry, JsonCodec};
pub use component::{Activation, Component, ComponentManager, ComponentStatus};
pub use config::ServerConfig;
pub use environment::{Env, Environment};
pub use error::{BoxError, ComponentError, RouteError, ServerError, TaskError};
pub use filter::{Filter, Next};
pub use http::{
    handler_fn, task_fn, websocket_fn, Handler, Request, Response, Server, ServerBuilder,
    TaskHandler, WebSocketConn, WebSocketHandler,
};
pub use lifecycle::{shutdown_signal, LifecycleState};
pub use routing::PathVars;
