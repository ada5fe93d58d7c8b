//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper connection, router, request ID, tracing)
//!     → pipeline.rs (auth → rate limit → body limit)
//!     → proxy.rs (route, rewrite, forward)
//!         → request.rs (outbound URI and headers)
//!         → upstream transport
//!         → stream.rs (upgrade response framing) / websocket.rs (tunnel)
//!     → response.rs (error envelope)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod stream;
pub mod websocket;

pub use pipeline::{Pipeline, Stage};
pub use proxy::{EngineError, ProxyEngine};
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
