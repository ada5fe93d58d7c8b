//! Ordered request-processing stages.
//!
//! Every stage either hands the (possibly rewritten) request to the next
//! one or short-circuits with a [`ProxyError`]. Order is the order stages
//! were added, nothing else.
//!
//! ```text
//! request → auth → rate limit → body limit → proxy handler
//!             ↓         ↓            ↓
//!            401       429          413
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::security::{ApiKeyAuth, BodyLimit, Rate, RateLimiter};

/// One step of the pipeline.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Continue with `Ok(request)` or stop with an error.
    fn process(&self, request: Request<Body>, peer: SocketAddr)
        -> Result<Request<Body>, ProxyError>;
}

/// Immutable, cheaply clonable stage list.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Arc<Vec<Box<dyn Stage>>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages: Arc::new(stages),
        }
    }

    /// auth → rate limit (if configured) → body limit.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(ApiKeyAuth)];
        if let Some(rate) = Rate::parse(&config.rate_limit) {
            stages.push(Box::new(RateLimiter::new(rate)));
        }
        stages.push(Box::new(BodyLimit::new(config.max_body_bytes())));
        Self::new(stages)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, stopping at the first rejection.
    pub fn run(
        &self,
        mut request: Request<Body>,
        peer: SocketAddr,
    ) -> Result<Request<Body>, ProxyError> {
        for stage in self.stages.iter() {
            request = stage.process(request, peer).map_err(|err| {
                tracing::debug!(stage = stage.name(), peer = %peer, "Request short-circuited");
                metrics::record_rejected(err.kind());
                err
            })?;
        }
        Ok(request)
    }
}

/// Axum middleware adapter for [`Pipeline`].
pub async fn pipeline_middleware(
    State(pipeline): State<Pipeline>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match pipeline.run(request, peer) {
        Ok(request) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}
