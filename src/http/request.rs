//! Outbound request preparation.
//!
//! # Responsibilities
//! - Build the absolute upstream URI (base path + stripped path + query)
//! - Drop hop-by-hop headers, then restore the upgrade handshake and `TE: trailers`
//! - Hand the header set to the sanitizer
//!
//! # Design Decisions
//! - The inbound request is consumed, its body is streamed, never buffered
//! - Outbound HTTP version is left to the client so h2 can be negotiated per host

use axum::body::Body;
use axum::http::header::{CONNECTION, TE, UPGRADE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri};

use crate::error::ProxyError;
use crate::routing::Resolved;
use crate::security::headers::{contains_token, strip_hop_by_hop, upgrade_protocol};
use crate::security::HeaderSanitizer;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Request id assigned by the request-id layer, or `"-"`.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// Everything needed to send one request upstream.
#[derive(Debug)]
pub struct ForwardingContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub upgrade: Option<HeaderValue>,
}

impl ForwardingContext {
    pub fn new(
        parts: &Parts,
        resolved: &Resolved<'_>,
        sanitizer: &HeaderSanitizer,
    ) -> Result<Self, ProxyError> {
        let upstream = resolved.route.upstream();
        let uri = upstream
            .uri_for(&resolved.path, parts.uri.query())
            .map_err(|e| ProxyError::Dial(format!("invalid upstream uri: {e}")))?;

        let mut headers = parts.headers.clone();
        let upgrade = upgrade_protocol(&headers);
        let trailers = contains_token(&headers, &TE, "trailers");

        strip_hop_by_hop(&mut headers);
        sanitizer.sanitize(&mut headers, upstream.host_header());

        if let Some(protocol) = &upgrade {
            headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(UPGRADE, protocol.clone());
        }
        if trailers {
            headers.insert(TE, HeaderValue::from_static("trailers"));
        }

        Ok(Self {
            method: parts.method.clone(),
            uri,
            headers,
            upgrade,
        })
    }

    pub fn into_request(self, body: Body) -> Request<Body> {
        let mut request = Request::new(body);
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.headers_mut() = self.headers;
        request
    }
}
