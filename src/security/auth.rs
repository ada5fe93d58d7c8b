//! API key presence check.
//!
//! Only presence is verified; the upstream provider validates the key.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request};

use crate::error::ProxyError;
use crate::http::pipeline::Stage;
use crate::security::headers::X_API_KEY;

/// Rejects requests carrying neither `Authorization` nor `x-api-key`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiKeyAuth;

fn has_credential(headers: &HeaderMap) -> bool {
    [AUTHORIZATION, X_API_KEY]
        .iter()
        .filter_map(|name| headers.get(name))
        .any(|value| !value.is_empty())
}

impl Stage for ApiKeyAuth {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn process(
        &self,
        request: Request<Body>,
        peer: SocketAddr,
    ) -> Result<Request<Body>, ProxyError> {
        if has_credential(request.headers()) {
            Ok(request)
        } else {
            tracing::warn!(peer = %peer, path = %request.uri().path(), "Unauthorized access request");
            Err(ProxyError::Unauthorized)
        }
    }
}
