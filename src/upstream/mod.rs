//! Upstream connectivity.
//!
//! # Data Flow
//! ```text
//! outbound request
//!     → transport.rs (host slot, pooled client, header deadline)
//!     → connector.rs (dial + TLS deadline)
//!     → Exchange (response head, slot still held)
//!     → body.rs (slot released when the body ends)
//! ```

pub mod body;
pub mod connector;
pub mod transport;

pub use transport::{Exchange, HostSlot, TlsSetupError, UpstreamTransport};
