//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (RouteTable::resolve)
//!     → matcher.rs (prefix test and strip)
//!     → Return: matched Route + stripped path, or no match
//!
//! Route Compilation (at startup):
//!     path_map (declaration order)
//!     → parse every upstream URL (fail on the first bad one)
//!     → stable sort by prefix length, longest first
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route
//! - Explicit no-match; the caller turns it into a 404

pub mod matcher;
pub mod router;

pub use router::{parse_upstream, Resolved, Route, RouteError, RouteTable, Upstream};
