//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Connections (connection.rs):
//!     request starts → Active (tracked)
//!     request ends   → Idle (untracked; closed if Destroyed)
//!     hijack         → Hijacked (untracked for good)
//!     websocket      → Upgraded (never tracked)
//!
//! Shutdown (Server::shutdown):
//!     Normal → Destroyed → stop accept → drain tracked (bounded) → teardown
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One-way state: a server is never restarted after shutdown
//! - Shutdown has an optional timeout; teardown runs either way
//! - Hijacked and upgraded connections belong to the application, not the drain

pub mod connection;
pub mod signals;

pub use connection::{
    ConnState, ConnectionId, ConnectionTracker, Disposition, LifecycleState, TrackedRequest,
};
pub use signals::shutdown_signal;
