//! Per-request failures.
//!
//! Every stage of request handling reports failures as a [`ProxyError`];
//! `http::response` turns it into the client-visible JSON envelope.

use std::error::Error as StdError;

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// No configured prefix matches the request path.
    #[error("Unknown path: {0}")]
    RouteNotFound(String),

    /// Dial, handshake, or transport I/O failure talking to the upstream.
    #[error("Proxy request failed: {0}")]
    Dial(String),

    /// The upstream did not answer in time.
    #[error("Proxy request failed: {0}")]
    Timeout(String),

    /// Neither `Authorization` nor `x-api-key` was supplied.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Request body too large")]
    BodyTooLarge,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Dial(_) | ProxyError::Timeout(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::RouteNotFound(_) => "route_not_found",
            ProxyError::Dial(_) => "dial",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::Unauthorized => "unauthorized",
            ProxyError::RateLimited => "rate_limited",
            ProxyError::BodyTooLarge => "body_too_large",
        }
    }
}

/// Render an error and its sources as `outer: inner: root`.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, Error)]
    #[error("client error (Connect)")]
    struct Outer(#[source] io::Error);

    #[test]
    fn messages_match_envelope_text() {
        assert_eq!(
            ProxyError::RouteNotFound("/nope".into()).to_string(),
            "Unknown path: /nope"
        );
        assert_eq!(
            ProxyError::Dial("connection refused".into()).to_string(),
            "Proxy request failed: connection refused"
        );
        assert_eq!(ProxyError::Unauthorized.to_string(), "Unauthorized");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ProxyError::RouteNotFound(String::new()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ProxyError::Timeout(String::new()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ProxyError::BodyTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ProxyError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn chain_includes_sources() {
        let err = Outer(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        assert_eq!(error_chain(&err), "client error (Connect): connection refused");
    }
}
