//! Per-client token-bucket rate limiting.
//!
//! Limits are written `<count>-<unit>` where unit is one of `S`, `M`, `H`,
//! `D` (second, minute, hour, day), e.g. `100-M`. Clients are keyed by peer
//! IP. An empty limit string disables the stage entirely.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Request;

use crate::error::ProxyError;
use crate::http::pipeline::Stage;

/// Table size above which buckets idle for a full period are pruned, at most
/// once per period.
const PRUNE_THRESHOLD: usize = 10_000;

/// `count` requests per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub count: u32,
    pub period: Duration,
}

impl Rate {
    /// Parse `<count>-<S|M|H|D>`. Returns `None` for empty or malformed input.
    pub fn parse(text: &str) -> Option<Rate> {
        let (count, unit) = text.trim().split_once('-')?;
        let count: u32 = count.trim().parse().ok()?;
        if count == 0 {
            return None;
        }
        let secs = match unit.trim().to_ascii_uppercase().as_str() {
            "S" => 1,
            "M" => 60,
            "H" => 3_600,
            "D" => 86_400,
            _ => return None,
        };
        Some(Rate {
            count,
            period: Duration::from_secs(secs),
        })
    }

    fn capacity(&self) -> f64 {
        f64::from(self.count)
    }

    /// Tokens regained per second.
    fn refill_rate(&self) -> f64 {
        self.capacity() / self.period.as_secs_f64()
    }
}

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, rate: &Rate, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate.refill_rate()).min(rate.capacity());
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Buckets {
    by_client: HashMap<IpAddr, TokenBucket>,
    last_prune: Option<Instant>,
}

pub struct RateLimiter {
    rate: Rate,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(rate: Rate) -> Self {
        Self {
            rate,
            buckets: Mutex::new(Buckets {
                by_client: HashMap::new(),
                last_prune: None,
            }),
        }
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Take one token for `client`, returning false when the bucket is empty.
    pub fn check(&self, client: IpAddr) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let period = self.rate.period;

        let prune_due = buckets
            .last_prune
            .map_or(true, |last| now.duration_since(last) >= period);
        if buckets.by_client.len() >= PRUNE_THRESHOLD && prune_due {
            buckets
                .by_client
                .retain(|_, b| now.duration_since(b.last_update) < period);
            buckets.last_prune = Some(now);
            tracing::debug!(remaining = buckets.by_client.len(), "Pruned idle rate limit buckets");
        }

        buckets
            .by_client
            .entry(client)
            .or_insert_with(|| TokenBucket::new(self.rate.capacity(), now))
            .try_acquire(&self.rate, now)
    }
}

impl Stage for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process(
        &self,
        request: Request<Body>,
        peer: SocketAddr,
    ) -> Result<Request<Body>, ProxyError> {
        if self.check(peer.ip()) {
            Ok(request)
        } else {
            tracing::warn!(client = %peer.ip(), limit = self.rate.count, "Rate limit exceeded");
            Err(ProxyError::RateLimited)
        }
    }
}
