//! AI API reverse proxy.
//!
//! Relays client requests to AI provider APIs by longest path prefix,
//! sanitizing headers on the way out and streaming responses back.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                    AI API PROXY                       │
//!                         │                                                       │
//!   Client Request        │  ┌─────────┐   ┌──────────┐   ┌───────────────────┐  │
//!   ──────────────────────┼─▶│   net   │──▶│   http   │──▶│ pipeline          │  │
//!                         │  │listener │   │  server  │   │ auth→rate→body    │  │
//!                         │  └─────────┘   └────┬─────┘   └─────────┬─────────┘  │
//!                         │                     │ /generate_204     ▼            │
//!                         │                     ▼             ┌──────────────┐   │
//!                         │                    204            │   routing    │   │
//!                         │                                   │ longest pfx  │   │
//!                         │                                   └──────┬───────┘   │
//!                         │                                          ▼           │
//!   Client Response       │  ┌──────────┐   ┌──────────────┐  ┌──────────────┐   │
//!   ◀─────────────────────┼──│ stream / │◀──│   upstream   │◀─│   security   │   │
//!                         │  │ tunnel   │   │  transport   │  │ header rules │   │
//!                         │  └──────────┘   └──────┬───────┘  └──────────────┘   │
//!                         │                        │                              │
//!                         │  config · lifecycle · observability                   │
//!                         └────────────────────────┼─────────────────────────────┘
//!                                                  ▼
//!                                            AI provider API
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod routing;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
