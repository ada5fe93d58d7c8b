//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Assemble the Axum router: health check endpoint, pipeline, security headers, proxy
//! - Wire up request ID and tracing layers
//! - Serve HTTP/1.1 and HTTP/2 (with upgrades) on the bounded listener
//! - Stop accepting, drain, and force-close on shutdown
//!
//! # Layering
//! ```text
//! SetRequestId → Trace → PropagateRequestId
//!     ├── GET /generate_204 → 204 (nothing else runs)
//!     └── everything else → security headers → pipeline → proxy handler
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware,
    routing::{any, get},
    Router,
};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::pipeline::{pipeline_middleware, Pipeline};
use crate::http::proxy::{proxy_handler, EngineError, ProxyEngine};
use crate::http::request::request_id;
use crate::http::websocket::Tunnels;
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionTracker, IdleTimeout, Listener};
use crate::security::headers::security_headers;

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    tunnels: Arc<Tunnels>,
}

impl HttpServer {
    pub fn new(config: ProxyConfig) -> Result<Self, EngineError> {
        let tunnels = Arc::new(Tunnels::new());
        let engine = Arc::new(ProxyEngine::new(&config, tunnels.clone())?);
        let pipeline = Pipeline::from_config(&config);
        tracing::info!(stages = ?pipeline.stage_names(), "Request pipeline assembled");

        let router = Self::build_router(engine, pipeline);
        Ok(Self {
            router,
            config,
            tunnels,
        })
    }

    fn build_router(engine: Arc<ProxyEngine>, pipeline: Pipeline) -> Router {
        let mut proxied = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(engine)
            .layer(middleware::from_fn_with_state(pipeline, pipeline_middleware));

        for (name, value) in security_headers() {
            proxied = proxied.layer(SetResponseHeaderLayer::overriding(name, value));
        }

        Router::new()
            .route(
                "/generate_204",
                get(generate_204).fallback_service(proxied.clone()),
            )
            .fallback_service(proxied)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve connections from `listener` until `shutdown` fires, then drain.
    ///
    /// In-flight connections and upgraded tunnels share one `shutdown_grace_secs`
    /// deadline to finish; whatever is still open afterwards is closed.
    pub async fn run(self, listener: Listener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.server.header_read_timeout());
        builder.http2().timer(TokioTimer::new());

        let idle_timeout = self.config.server.idle_timeout();
        let tracker = ConnectionTracker::new();
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    let guard = tracker.track();
                    let router = self.router.clone();
                    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                        request.extensions_mut().insert(ConnectInfo(peer));
                        router.clone().oneshot(request)
                    });

                    let io = TokioIo::new(IdleTimeout::new(stream, idle_timeout));
                    let connection = builder.serve_connection_with_upgrades(io, service).into_owned();
                    let connection = graceful.watch(connection);

                    connections.spawn(async move {
                        if let Err(e) = connection.await {
                            tracing::debug!(connection_id = %guard.id(), peer = %peer, error = %e, "Connection ended with error");
                        }
                        drop(permit);
                        drop(guard);
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);

        let grace = self.config.server.shutdown_grace();
        let deadline = tokio::time::Instant::now() + grace;
        tracing::info!(
            active = tracker.active_count(),
            tunnels = self.tunnels.open_count(),
            grace_secs = grace.as_secs(),
            "Draining connections"
        );

        tokio::select! {
            _ = graceful.shutdown() => {
                tracing::info!("All connections drained");
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(remaining = tracker.active_count(), "Grace period elapsed, forcing close");
                connections.abort_all();
            }
        }

        tokio::select! {
            _ = self.tunnels.drained() => {}
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(remaining = self.tunnels.open_count(), "Grace period elapsed, closing tunnels");
            }
        }

        self.tunnels.close_all();
        while connections.join_next().await.is_some() {}

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn generate_204() -> StatusCode {
    StatusCode::NO_CONTENT
}
