//! Connect deadline wrapper.
//!
//! `HttpConnector` bounds the TCP dial but the TLS handshake that follows has
//! no limit of its own. [`ConnectDeadline`] bounds the whole connect future
//! (dial plus handshake) with a single deadline.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::Uri;
use thiserror::Error;
use tower::Service;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
#[error("connect to upstream timed out after {0:?}")]
pub struct ConnectTimedOut(pub Duration);

#[derive(Debug, Clone)]
pub struct ConnectDeadline<C> {
    inner: C,
    deadline: Duration,
}

impl<C> ConnectDeadline<C> {
    pub fn new(inner: C, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

impl<C> Service<Uri> for ConnectDeadline<C>
where
    C: Service<Uri>,
    C::Future: Send + 'static,
    C::Error: Into<BoxError>,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<C::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let connecting = self.inner.call(uri);
        let deadline = self.deadline;
        Box::pin(async move {
            match tokio::time::timeout(deadline, connecting).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(Box::new(ConnectTimedOut(deadline)) as BoxError),
            }
        })
    }
}
