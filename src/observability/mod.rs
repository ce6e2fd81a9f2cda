//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → under the server span (`Environment::logger`)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, text or JSON)
//! ```
//!
//! # Design Decisions
//! - Library code only emits events; the binary installs the subscriber
//! - Request ID flows through the access log via `RequestIdFilter`

pub mod logging;

pub use logging::init_logging;
