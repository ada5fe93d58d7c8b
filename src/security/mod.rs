//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (credential presence)
//!     → rate_limit.rs (per-IP token bucket)
//!     → limits.rs (body size)
//!     → routing
//!     → headers.rs (sanitize outbound headers, egress IP)
//! ```
//!
//! # Design Decisions
//! - Fail closed: any stage rejection ends the request
//! - Credentials are forwarded, never inspected or logged

pub mod auth;
pub mod headers;
pub mod limits;
pub mod rate_limit;

pub use auth::ApiKeyAuth;
pub use headers::{HeaderPolicy, HeaderSanitizer};
pub use limits::BodyLimit;
pub use rate_limit::{Rate, RateLimiter};
