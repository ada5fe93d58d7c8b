//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Path prefix -> upstream base URL, in declaration order.
    pub path_map: IndexMap<String, String>,

    /// When set, overwrites `X-Real-IP` and `X-Forwarded-For` on every
    /// forwarded request.
    pub fixed_request_ip: Option<String>,

    /// Per-client rate in `<count>-<S|M|H|D>` form. Empty disables limiting.
    pub rate_limit: String,

    /// Request body ceiling in MiB.
    pub max_request_body_size_mb: u64,

    /// Listener configuration (bind address, accept bound).
    pub listener: ListenerConfig,

    /// Client-facing connection settings.
    pub server: ServerConfig,

    /// Upstream connection pool settings.
    pub transport: TransportConfig,

    /// Log sinks and level.
    pub logging: LoggingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            path_map: IndexMap::new(),
            fixed_request_ip: None,
            rate_limit: "100-M".to_string(),
            max_request_body_size_mb: 100,
            listener: ListenerConfig::default(),
            server: ServerConfig::default(),
            transport: TransportConfig::default(),
            logging: LoggingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Body ceiling in bytes.
    pub fn max_body_bytes(&self) -> u64 {
        self.max_request_body_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3002").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3002".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Client-facing connection timeouts and shutdown grace.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Deadline for reading a request head.
    pub header_read_timeout_secs: u64,

    /// A client connection with no read or write progress for this long is closed.
    pub idle_timeout_secs: u64,

    /// In-flight requests get this long to finish after shutdown starts.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            header_read_timeout_secs: 90,
            idle_timeout_secs: 120,
            shutdown_grace_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn header_read_timeout(&self) -> Duration {
        Duration::from_secs(self.header_read_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Upstream connection pool tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TCP connect timeout in seconds.
    pub dial_timeout_secs: u64,

    /// TCP keep-alive interval in seconds.
    pub keep_alive_secs: u64,

    /// Idle pooled connections are evicted after this many seconds.
    pub idle_conn_timeout_secs: u64,

    /// TLS handshake timeout in seconds, counted after the TCP connect.
    pub tls_handshake_timeout_secs: u64,

    /// Deadline for upstream response headers in seconds.
    pub response_header_timeout_secs: u64,

    /// Idle connections kept across all hosts.
    pub max_idle_conns: usize,

    /// Idle connections kept per host.
    pub max_idle_conns_per_host: usize,

    /// In-flight exchanges allowed per host.
    pub max_conns_per_host: usize,

    /// Offer HTTP/2 via ALPN for non-upgrade requests.
    pub force_attempt_http2: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_timeout_secs: 30,
            keep_alive_secs: 30,
            idle_conn_timeout_secs: 90,
            tls_handshake_timeout_secs: 10,
            response_header_timeout_secs: 90,
            max_idle_conns: 100,
            max_idle_conns_per_host: 100,
            max_conns_per_host: 100,
            force_attempt_http2: true,
        }
    }
}

impl TransportConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn idle_conn_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_conn_timeout_secs)
    }

    pub fn tls_handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_handshake_timeout_secs)
    }

    pub fn response_header_timeout(&self) -> Duration {
        Duration::from_secs(self.response_header_timeout_secs)
    }

    /// Per-host idle bound, clamped by the global bound.
    pub fn effective_idle_per_host(&self) -> usize {
        self.max_idle_conns_per_host.min(self.max_idle_conns)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the log file. Created if missing.
    pub log_dir: String,

    /// Log file name inside `log_dir`.
    pub log_name: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            log_name: "app.log".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [path_map]
            "/openai" = "https://api.openai.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.path_map.len(), 1);
        assert_eq!(config.rate_limit, "100-M");
        assert_eq!(config.max_body_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.transport.dial_timeout(), Duration::from_secs(30));
        assert_eq!(config.server.shutdown_grace(), Duration::from_secs(10));
        assert!(config.fixed_request_ip.is_none());
    }

    #[test]
    fn path_map_keeps_declaration_order() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [path_map]
            "/zeta" = "http://z.example"
            "/alpha" = "http://a.example"
            "/mid" = "http://m.example"
            "#,
        )
        .unwrap();

        let prefixes: Vec<&str> = config.path_map.keys().map(String::as_str).collect();
        assert_eq!(prefixes, ["/zeta", "/alpha", "/mid"]);
    }

    #[test]
    fn idle_per_host_is_clamped_by_total() {
        let transport = TransportConfig {
            max_idle_conns: 10,
            max_idle_conns_per_host: 50,
            ..TransportConfig::default()
        };
        assert_eq!(transport.effective_idle_per_host(), 10);
    }
}
