//! Upgraded connection tunnelling.
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Proxy ←──── raw bytes ────→ Upstream
//! ```
//!
//! # Design Decisions
//! - Protocol-agnostic: bytes are copied both ways, frames are not parsed
//! - The upstream side is upgraded before the 101 is relayed, so a failed
//!   upstream switch still yields a normal error response
//! - The upstream host slot stays held for the lifetime of the tunnel
//! - Open tunnels are counted so shutdown can wait for them inside the same
//!   grace period as HTTP connections, and close the rest afterwards

use std::sync::Arc;

use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tokio::io::copy_bidirectional;
use tokio::sync::watch;

use crate::lifecycle::Shutdown;
use crate::upstream::HostSlot;

/// Registry of open tunnels.
#[derive(Debug)]
pub struct Tunnels {
    open: Arc<watch::Sender<usize>>,
    force_close: Shutdown,
}

impl Default for Tunnels {
    fn default() -> Self {
        Self::new()
    }
}

impl Tunnels {
    pub fn new() -> Self {
        let (open, _) = watch::channel(0);
        Self {
            open: Arc::new(open),
            force_close: Shutdown::new(),
        }
    }

    pub fn open_count(&self) -> usize {
        *self.open.borrow()
    }

    /// Resolve once no tunnel is open.
    pub async fn drained(&self) {
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|n| *n == 0).await;
    }

    /// Close every open tunnel, and any opened later.
    pub fn close_all(&self) {
        self.force_close.trigger();
    }

    /// Splice `upstream` to the client connection once the client side upgrades.
    pub fn spawn(&self, client: OnUpgrade, upstream: Upgraded, slot: HostSlot, route: String) {
        let guard = OpenTunnel::new(self.open.clone());
        let mut force_close = self.force_close.subscribe();

        tokio::spawn(async move {
            let _guard = guard;
            let _slot = slot;
            let client = match client.await {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    tracing::warn!(route = %route, error = %e, "Client upgrade failed");
                    return;
                }
            };

            let mut client = TokioIo::new(client);
            let mut upstream = TokioIo::new(upstream);
            tracing::debug!(route = %route, "Tunnel open");

            tokio::select! {
                result = copy_bidirectional(&mut client, &mut upstream) => match result {
                    Ok((sent, received)) => {
                        tracing::debug!(route = %route, sent, received, "Tunnel closed");
                    }
                    Err(e) => {
                        tracing::debug!(route = %route, error = %e, "Tunnel closed with error");
                    }
                },
                _ = force_close.recv() => {
                    tracing::info!(route = %route, "Tunnel closed by shutdown");
                }
            }
        });
    }
}

/// Counts one tunnel as open until dropped.
struct OpenTunnel {
    open: Arc<watch::Sender<usize>>,
}

impl OpenTunnel {
    fn new(open: Arc<watch::Sender<usize>>) -> Self {
        open.send_modify(|n| *n += 1);
        Self { open }
    }
}

impl Drop for OpenTunnel {
    fn drop(&mut self) {
        self.open.send_modify(|n| *n -= 1);
    }
}
