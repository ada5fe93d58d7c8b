//! Pooled HTTP(S) client used for every upstream exchange.
//!
//! # Responsibilities
//! - Keep-alive connection pooling with idle bounds
//! - Dial, handshake, and response-header deadlines
//! - Cap concurrent exchanges per upstream host
//! - Send upgrade requests over HTTP/1.1 so the tunnel can be taken over
//!
//! # Design Decisions
//! - Two clients share one configuration: the main client negotiates h2 via
//!   ALPN when allowed, the upgrade client is HTTP/1.1 only
//! - A host slot is held until the response body ends (or the tunnel closes),
//!   not merely until headers arrive
//! - Nothing is retried; the first failure is reported

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use dashmap::DashMap;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::crypto::ring;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::TransportConfig;
use crate::error::{error_chain, ProxyError};
use crate::security::headers::upgrade_protocol;
use crate::security::limits::is_length_limit;
use crate::upstream::body::SlotBody;
use crate::upstream::connector::{ConnectDeadline, ConnectTimedOut};

type Connector = ConnectDeadline<HttpsConnector<HttpConnector>>;

/// The TLS client configuration for upstreams could not be built.
#[derive(Debug, Error)]
#[error("upstream TLS setup failed: {0}")]
pub struct TlsSetupError(String);

/// Permission to run one exchange against a host. Released on drop.
#[derive(Debug)]
pub struct HostSlot {
    _permit: OwnedSemaphorePermit,
}

/// An upstream response with its host slot still held.
#[derive(Debug)]
pub struct Exchange {
    response: Response<Incoming>,
    slot: HostSlot,
}

impl Exchange {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn into_parts(self) -> (Response<Incoming>, HostSlot) {
        (self.response, self.slot)
    }

    /// Convert into a streaming response whose body releases the slot at its end.
    pub fn into_streaming(self) -> Response<Body> {
        let (parts, body) = self.response.into_parts();
        Response::from_parts(parts, Body::new(SlotBody::new(body, self.slot)))
    }
}

pub struct UpstreamTransport {
    client: Client<Connector, Body>,
    upgrade_client: Client<Connector, Body>,
    hosts: DashMap<String, Arc<Semaphore>>,
    max_conns_per_host: usize,
    response_header_timeout: Duration,
}

impl UpstreamTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TlsSetupError> {
        Ok(Self {
            client: build_client(config, config.force_attempt_http2)?,
            upgrade_client: build_client(config, false)?,
            hosts: DashMap::new(),
            max_conns_per_host: config.max_conns_per_host,
            response_header_timeout: config.response_header_timeout(),
        })
    }

    /// Send `request` upstream and wait for the response head.
    ///
    /// The request URI must be absolute. Waits for a free host slot first;
    /// dropping the future while waiting gives up the place in line.
    pub async fn forward(&self, request: Request<Body>) -> Result<Exchange, ProxyError> {
        let authority = request
            .uri()
            .authority()
            .map(|a| a.to_string())
            .ok_or_else(|| ProxyError::Dial(format!("no authority in {}", request.uri())))?;

        let slot = self.acquire(&authority).await?;
        tracing::trace!(
            upstream = %authority,
            in_flight = self.in_flight(&authority),
            "Upstream slot acquired"
        );

        let client = if upgrade_protocol(request.headers()).is_some() {
            &self.upgrade_client
        } else {
            &self.client
        };

        match tokio::time::timeout(self.response_header_timeout, client.request(request)).await {
            Ok(Ok(response)) => Ok(Exchange { response, slot }),
            Ok(Err(err)) => Err(classify(&err)),
            Err(_) => Err(ProxyError::Timeout(format!(
                "{authority} sent no response headers within {:?}",
                self.response_header_timeout
            ))),
        }
    }

    /// Exchanges currently running against `authority`.
    pub fn in_flight(&self, authority: &str) -> usize {
        self.hosts
            .get(authority)
            .map(|s| self.max_conns_per_host - s.available_permits())
            .unwrap_or(0)
    }

    async fn acquire(&self, authority: &str) -> Result<HostSlot, ProxyError> {
        let semaphore = self
            .hosts
            .entry(authority.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_conns_per_host)))
            .clone();

        if semaphore.available_permits() == 0 {
            tracing::debug!(upstream = %authority, limit = self.max_conns_per_host, "Waiting for upstream slot");
        }

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| ProxyError::Dial(format!("slot pool for {authority} closed")))?;
        Ok(HostSlot { _permit: permit })
    }
}

/// Uses the `ring` provider explicitly; rustls cannot pick a default when
/// more than one provider is compiled in.
fn build_client(
    config: &TransportConfig,
    http2: bool,
) -> Result<Client<Connector, Body>, TlsSetupError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);
    http.set_connect_timeout(Some(config.dial_timeout()));
    http.set_keepalive(Some(config.keep_alive()));

    let builder = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(ring::default_provider())
        .map_err(|e| TlsSetupError(e.to_string()))?
        .https_or_http()
        .enable_http1();
    let https = if http2 {
        builder.enable_http2().wrap_connector(http)
    } else {
        builder.wrap_connector(http)
    };

    let connector = ConnectDeadline::new(https, config.dial_timeout() + config.tls_handshake_timeout());

    Ok(Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(config.idle_conn_timeout())
        .pool_max_idle_per_host(config.effective_idle_per_host())
        .build(connector))
}

fn classify(err: &(dyn StdError + 'static)) -> ProxyError {
    if is_length_limit(err) {
        return ProxyError::BodyTooLarge;
    }
    let detail = error_chain(err);
    if is_timeout(err) {
        ProxyError::Timeout(detail)
    } else {
        ProxyError::Dial(detail)
    }
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<ConnectTimedOut>() {
            return true;
        }
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if io.kind() == io::ErrorKind::TimedOut {
                return true;
            }
        }
        current = e.source();
    }
    false
}
