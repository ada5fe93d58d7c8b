//! Request forwarding core.
//!
//! ```text
//! request → RouteTable::resolve ──none──→ 404
//!              │
//!              ▼
//!        ForwardingContext (URI rewrite, header sanitizing)
//!              │
//!              ▼
//!        UpstreamTransport::forward ──err──→ 502
//!              │
//!       ┌──────┴───────┐
//!      101            other
//!       │               │
//!  tunnel task    stream adapter → hop-by-hop strip → client
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::request::{request_id, ForwardingContext};
use crate::http::stream;
use crate::http::websocket::Tunnels;
use crate::observability::metrics;
use crate::routing::{Resolved, RouteError, RouteTable};
use crate::security::headers::{strip_hop_by_hop, upgrade_protocol};
use crate::security::{HeaderPolicy, HeaderSanitizer};
use crate::upstream::{Exchange, TlsSetupError, UpstreamTransport};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Routes(#[from] RouteError),

    #[error("invalid fixed_request_ip {0:?}")]
    FixedIp(String),

    #[error(transparent)]
    Tls(#[from] TlsSetupError),
}

/// Routes, rewrites, and forwards requests to their upstream.
pub struct ProxyEngine {
    routes: RouteTable,
    sanitizer: HeaderSanitizer,
    transport: UpstreamTransport,
    tunnels: Arc<Tunnels>,
}

impl ProxyEngine {
    /// Upgraded connections are registered in `tunnels`.
    pub fn new(config: &ProxyConfig, tunnels: Arc<Tunnels>) -> Result<Self, EngineError> {
        let routes = RouteTable::new(&config.path_map)?;

        let fixed_ip = match config.fixed_request_ip.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(ip) => Some(
                HeaderValue::from_str(ip).map_err(|_| EngineError::FixedIp(ip.to_string()))?,
            ),
        };

        tracing::info!(
            routes = ?routes.prefixes(),
            fixed_egress_ip = fixed_ip.is_some(),
            "Proxy engine ready"
        );

        Ok(Self {
            routes,
            sanitizer: HeaderSanitizer::new(HeaderPolicy::default(), fixed_ip),
            transport: UpstreamTransport::new(&config.transport)?,
            tunnels,
        })
    }

    /// Forward one request and produce the client response, errors included.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().to_string();
        let path = request.uri().path().to_string();

        let (route, result) = match self.routes.resolve(&path) {
            Some(resolved) => {
                let route = resolved.route.prefix().to_string();
                let result = self.forward(request, resolved, route.clone()).await;
                (route, result)
            }
            None => ("none".to_string(), Err(ProxyError::RouteNotFound(path))),
        };

        let response = result.unwrap_or_else(|err| {
            metrics::record_rejected(err.kind());
            err.into_response()
        });
        metrics::record_request(&method, response.status().as_u16(), &route, start);
        response
    }

    async fn forward(
        &self,
        mut request: Request<Body>,
        resolved: Resolved<'_>,
        route: String,
    ) -> Result<Response<Body>, ProxyError> {
        let client_upgrade = upgrade_protocol(request.headers())
            .map(|_| hyper::upgrade::on(&mut request));

        let (parts, body) = request.into_parts();
        let ctx = ForwardingContext::new(&parts, &resolved, &self.sanitizer)?;

        tracing::debug!(
            request_id = %request_id(&parts.headers),
            method = %ctx.method,
            route = %route,
            upstream = %ctx.uri,
            "Forwarding request"
        );

        let exchange = self.transport.forward(ctx.into_request(body)).await?;

        if exchange.status() == StatusCode::SWITCHING_PROTOCOLS {
            return self.switch_protocols(exchange, client_upgrade, route).await;
        }

        let mut response = stream::adapt(exchange.into_streaming());
        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }

    async fn switch_protocols(
        &self,
        exchange: Exchange,
        client_upgrade: Option<hyper::upgrade::OnUpgrade>,
        route: String,
    ) -> Result<Response<Body>, ProxyError> {
        let Some(client_upgrade) = client_upgrade else {
            return Err(ProxyError::Dial(
                "upstream switched protocols without an upgrade request".into(),
            ));
        };

        let (mut response, slot) = exchange.into_parts();
        let upstream = hyper::upgrade::on(&mut response)
            .await
            .map_err(|e| ProxyError::Dial(format!("upstream upgrade failed: {e}")))?;

        self.tunnels.spawn(client_upgrade, upstream, slot, route);

        // Connection and Upgrade are kept: they are the handshake.
        let (mut parts, _) = response.into_parts();
        parts.headers.remove(CONTENT_LENGTH);
        Ok(Response::from_parts(parts, Body::empty()))
    }
}

/// Fallback handler for every proxied path.
pub async fn proxy_handler(
    State(engine): State<Arc<ProxyEngine>>,
    request: Request<Body>,
) -> Response<Body> {
    engine.handle(request).await
}
