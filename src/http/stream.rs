//! Streaming adjustments to upstream responses.
//!
//! A response that announces a protocol upgrade must not carry a fixed
//! `Content-Length`: after the switch the connection is an open-ended byte
//! stream. Such responses lose the header and are re-framed as a stream so
//! the server cannot derive a length from the body either.

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, UPGRADE};
use axum::http::{HeaderMap, Response};

/// True when the response advertises a protocol upgrade.
pub fn is_upgrade_response(headers: &HeaderMap) -> bool {
    headers.get(UPGRADE).is_some_and(|v| !v.is_empty())
}

/// Drop `Content-Length` from upgrade responses; everything else passes through.
pub fn adapt(response: Response<Body>) -> Response<Body> {
    if !is_upgrade_response(response.headers()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    if parts.headers.remove(CONTENT_LENGTH).is_some() {
        tracing::debug!(status = parts.status.as_u16(), "Dropped Content-Length from upgrade response");
    }
    Response::from_parts(parts, Body::from_stream(body.into_data_stream()))
}
