//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept, TCP keep-alive)
//!     → tls.rs (optional TLS handshake, optional client certificates)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional and handled transparently
//! - An externally supplied rustls config wins over certificate paths
//! - Accept errors are logged and the loop continues

pub mod listener;
pub mod tls;

pub use listener::{bind, configure_stream};
pub use tls::load_tls_config;
