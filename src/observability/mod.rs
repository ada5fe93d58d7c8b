//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured events to stdout and the log file)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log files under `log_dir`
//!     → Metrics endpoint (Prometheus scrape), when enabled
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is attached to the trace span of every request
//! - Credential header values never reach the logs

pub mod logging;
pub mod metrics;
