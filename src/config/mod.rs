//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once by HttpServer::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields except `path_map` have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Exiting on a bad config is the binary's decision, not this module's

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ListenerConfig, LoggingConfig, ObservabilityConfig, ProxyConfig, ServerConfig,
    TransportConfig,
};
pub use validation::ValidationError;
