//! Request body size limit.
//!
//! A declared `Content-Length` above the limit is rejected before the body is
//! touched. Bodies without a declared length (chunked) are wrapped in
//! [`Limited`] so the cap also holds while streaming to the upstream; the
//! resulting [`LengthLimitError`] is recognised by [`is_length_limit`].

use std::error::Error as StdError;
use std::net::SocketAddr;

use axum::body::Body;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, Request};
use http_body_util::{LengthLimitError, Limited};

use crate::error::ProxyError;
use crate::http::pipeline::Stage;

#[derive(Debug, Clone, Copy)]
pub struct BodyLimit {
    max_bytes: u64,
}

impl BodyLimit {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

impl Stage for BodyLimit {
    fn name(&self) -> &'static str {
        "body_limit"
    }

    fn process(
        &self,
        request: Request<Body>,
        peer: SocketAddr,
    ) -> Result<Request<Body>, ProxyError> {
        if let Some(length) = declared_length(request.headers()) {
            if length > self.max_bytes {
                tracing::warn!(peer = %peer, length, max = self.max_bytes, "Request body too large");
                return Err(ProxyError::BodyTooLarge);
            }
        }

        let max = usize::try_from(self.max_bytes).unwrap_or(usize::MAX);
        Ok(request.map(|body| Body::new(Limited::new(body, max))))
    }
}

/// True when `err` or one of its sources is a body length overrun.
pub fn is_length_limit(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}
