//! Header manipulation and security headers.
//!
//! # Responsibilities
//! - Strip CDN metadata (`cf-*`, `cdn-loop`) from outbound requests
//! - Keep credentials (`authorization`, `x-api-key`) untouched
//! - Point `Host` at the upstream
//! - Mask the client address behind a fixed egress IP when configured
//! - Strip hop-by-hop headers on both legs
//! - Provide the security response header set
//!
//! # Design Decisions
//! - The keep-list always beats the deny rules
//! - Without a fixed egress IP, `X-Real-IP`/`X-Forwarded-For` pass through untouched
//! - Credential values never reach the audit log

use std::fmt;

use axum::http::header::{
    AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_SECURITY_POLICY, EXPIRES, HOST, PRAGMA,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
pub const CDN_LOOP: HeaderName = HeaderName::from_static("cdn-loop");

/// Hop-by-hop headers (RFC 7230 §6.1) never relayed between legs.
pub const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    CONNECTION,
    KEEP_ALIVE,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Which inbound headers survive forwarding.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    keep: Vec<HeaderName>,
    deny_prefixes: Vec<&'static str>,
    deny_exact: Vec<HeaderName>,
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self {
            keep: vec![AUTHORIZATION, X_API_KEY],
            deny_prefixes: vec!["cf-"],
            deny_exact: vec![CDN_LOOP],
        }
    }
}

impl HeaderPolicy {
    /// True when `name` must be removed before forwarding.
    pub fn is_denied(&self, name: &HeaderName) -> bool {
        if self.keep.contains(name) {
            return false;
        }
        let lower = name.as_str();
        self.deny_prefixes.iter().any(|p| lower.starts_with(p)) || self.deny_exact.contains(name)
    }
}

/// Applies a [`HeaderPolicy`] and the egress rewrites to an outbound header set.
#[derive(Debug, Clone, Default)]
pub struct HeaderSanitizer {
    policy: HeaderPolicy,
    fixed_ip: Option<HeaderValue>,
}

impl HeaderSanitizer {
    pub fn new(policy: HeaderPolicy, fixed_ip: Option<HeaderValue>) -> Self {
        Self { policy, fixed_ip }
    }

    /// Rewrite `headers` in place for the upstream identified by `host`.
    pub fn sanitize(&self, headers: &mut HeaderMap, host: &HeaderValue) {
        tracing::debug!(headers = ?Redacted(headers), "before request headers");

        let denied: Vec<HeaderName> = headers
            .keys()
            .filter(|name| self.policy.is_denied(name))
            .cloned()
            .collect();
        for name in &denied {
            headers.remove(name);
        }

        headers.insert(HOST, host.clone());

        if let Some(ip) = &self.fixed_ip {
            headers.insert(X_REAL_IP, ip.clone());
            headers.insert(X_FORWARDED_FOR, ip.clone());
        }

        tracing::debug!(headers = ?Redacted(headers), "after request headers");
    }
}

/// Returns true if any comma-separated value of `name` equals `token`, ignoring case.
pub fn contains_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// The requested protocol when the message asks for a connection upgrade.
pub fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    if !contains_token(headers, &CONNECTION, "upgrade") {
        return None;
    }
    headers.get(UPGRADE).cloned()
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|t| HeaderName::from_bytes(t.trim().as_bytes()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}

/// Headers added to every client-facing response.
pub fn security_headers() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
        (
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'"),
        ),
        (
            CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate, max-age=0"),
        ),
        (PRAGMA, HeaderValue::from_static("no-cache")),
        (EXPIRES, HeaderValue::from_static("0")),
    ]
}

fn is_credential(name: &HeaderName) -> bool {
    name == AUTHORIZATION || name == X_API_KEY || name == PROXY_AUTHORIZATION
}

/// Debug view of a header map with credential values masked.
pub struct Redacted<'a>(pub &'a HeaderMap);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.0 {
            if is_credential(name) {
                map.entry(&name.as_str(), &"<redacted>");
            } else {
                map.entry(&name.as_str(), value);
            }
        }
        map.finish()
    }
}
