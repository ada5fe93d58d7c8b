//! Configuration validation.
//!
//! Serde handles syntax; this module checks meaning. Every failure is
//! collected so an operator sees the whole list in one run.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::ProxyConfig;
use crate::routing::router::parse_upstream;
use crate::security::rate_limit::Rate;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("path_map is empty")]
    EmptyPathMap,

    #[error("path prefix {0:?} must start with '/'")]
    InvalidPrefix(String),

    #[error("upstream for {prefix:?} is invalid: {reason}")]
    InvalidUpstream { prefix: String, reason: String },

    #[error("fixed_request_ip {0:?} is not an IP address")]
    InvalidFixedIp(String),

    #[error("rate_limit {0:?} is not in <count>-<S|M|H|D> form")]
    InvalidRateLimit(String),

    #[error("bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("log_level {0:?} is not a valid filter")]
    InvalidLogLevel(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.path_map.is_empty() {
        errors.push(ValidationError::EmptyPathMap);
    }
    for (prefix, upstream) in &config.path_map {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPrefix(prefix.clone()));
        }
        if let Err(e) = parse_upstream(upstream) {
            errors.push(ValidationError::InvalidUpstream {
                prefix: prefix.clone(),
                reason: e.to_string(),
            });
        }
    }

    if let Some(ip) = config.fixed_request_ip.as_deref().map(str::trim) {
        if !ip.is_empty() && ip.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::InvalidFixedIp(ip.to_string()));
        }
    }

    if !config.rate_limit.is_empty() && Rate::parse(&config.rate_limit).is_none() {
        errors.push(ValidationError::InvalidRateLimit(config.rate_limit.clone()));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if EnvFilter::try_new(&config.logging.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.logging.log_level.clone(),
        ));
    }

    let t = &config.transport;
    let bounds = [
        ("max_request_body_size_mb", config.max_request_body_size_mb),
        ("listener.max_connections", config.listener.max_connections as u64),
        ("server.header_read_timeout_secs", config.server.header_read_timeout_secs),
        ("server.idle_timeout_secs", config.server.idle_timeout_secs),
        ("transport.dial_timeout_secs", t.dial_timeout_secs),
        ("transport.keep_alive_secs", t.keep_alive_secs),
        ("transport.idle_conn_timeout_secs", t.idle_conn_timeout_secs),
        ("transport.tls_handshake_timeout_secs", t.tls_handshake_timeout_secs),
        ("transport.response_header_timeout_secs", t.response_header_timeout_secs),
        ("transport.max_idle_conns", t.max_idle_conns as u64),
        ("transport.max_idle_conns_per_host", t.max_idle_conns_per_host as u64),
        ("transport.max_conns_per_host", t.max_conns_per_host as u64),
    ];
    for (name, value) in bounds {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
