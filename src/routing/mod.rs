//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (builder, before serving):
//!     pattern string
//!     → pattern.rs (parse into literal/variable/wildcard segments)
//!     → router.rs (insert into segment tree, reject conflicts)
//!     → route.rs (attach per-method handler / route filters)
//!
//! Incoming request path
//!     → router.rs (walk tree, capture into pooled PathVars)
//!     → Return: matched Route or None
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (segment tree only)
//! - Deterministic: literal > variable > wildcard at every segment
//! - Method lookup happens after matching so 404 and 405 stay distinct

pub mod pattern;
pub mod registry;
pub mod route;
pub mod router;
pub mod vars;

pub use pattern::{Pattern, Segment};
pub use registry::HandlerRegistry;
pub use route::Route;
pub use router::{Match, PatternRouter};
pub use vars::PathVars;

/// The HTTP route table.
pub type Router = PatternRouter<Route>;
