//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (hyper http1, connection tracking)
//!     → websocket.rs (upgrade requests on websocket routes)
//!     → request.rs (buffered body, path variables, environment)
//!     → filter chain → handler.rs
//!     → response.rs (default content type, Connection: close on shutdown)
//!     → Send to client
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod server;
pub mod task;
pub mod websocket;

pub use handler::{handler_fn, BoxFuture, Handler};
pub use request::{Request, X_REQUEST_ID};
pub use response::Response;
pub use server::{Server, ServerBuilder};
pub use task::{task_fn, TaskHandler, TaskValue};
pub use websocket::{websocket_fn, WebSocket, WebSocketConn, WebSocketHandler};
