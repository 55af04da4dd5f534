//! Token bucket admission control.
//!
//! # Responsibilities
//! - Continuous-refill token buckets, one per rate-limit key
//! - Atomic refill-and-take per bucket under concurrent callers
//! - Pipeline stage that rejects with 429 and a `Retry-After` hint
//!
//! # Design Decisions
//! - Buckets live in a sharded `DashMap`; a check holds its shard's write lock
//!   for the whole refill-and-take, so a token is never spent twice
//! - Elapsed time is clamped at zero, so a clock moving backward adds nothing
//! - Buckets are created full and kept for the process lifetime

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use futures_util::{future::BoxFuture, FutureExt};

use crate::config::{RateLimitConfig, RateLimitKeyStrategy};
use crate::http::request::RequestContext;
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::pipeline::{Next, Stage};

/// Key used when every caller shares one bucket.
pub const GLOBAL_KEY: &str = "global";

/// Time source for bucket refills.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The process monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Result of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admitted,
    /// `retry_after` is `None` when the bucket never refills.
    Rejected { retry_after: Option<Duration> },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> Admission {
        let elapsed = now
            .checked_duration_since(self.last_refill)
            .unwrap_or_default()
            .as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Admission::Admitted
        } else {
            let retry_after = (refill_rate > 0.0)
                .then(|| Duration::from_secs_f64((1.0 - self.tokens) / refill_rate));
            Admission::Rejected { retry_after }
        }
    }
}

/// Keyed token-bucket limiter with one fixed rate and burst for all keys.
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    rate: f64,
    capacity: f64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        Self::with_clock(requests_per_second, burst, Arc::new(MonotonicClock))
    }

    pub fn with_clock(requests_per_second: u32, burst: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            rate: f64::from(requests_per_second),
            capacity: f64::from(burst),
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }

    /// Check and, if admitted, consume one token from `key`'s bucket.
    pub fn check(&self, key: &str) -> Admission {
        let now = self.clock.now();

        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(now, self.capacity, self.rate);
        }

        let mut bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| TokenBucket::new(self.capacity, now));
        bucket.try_acquire(now, self.capacity, self.rate)
    }

    /// `true` when the request may proceed.
    pub fn admit(&self, key: &str) -> bool {
        self.check(key).is_admitted()
    }

    /// Tokens currently held by `key`'s bucket, without refilling it.
    #[cfg(test)]
    pub(crate) fn available(&self, key: &str) -> Option<f64> {
        self.buckets.get(key).map(|b| b.tokens)
    }

    /// Number of buckets created so far.
    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

/// Pipeline stage applying the limiter to every request.
pub struct RateLimitStage {
    limiter: Arc<RateLimiter>,
    strategy: RateLimitKeyStrategy,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<RateLimiter>, strategy: RateLimitKeyStrategy) -> Self {
        Self { limiter, strategy }
    }

    fn key(&self, ctx: &RequestContext) -> String {
        match self.strategy {
            RateLimitKeyStrategy::Global => GLOBAL_KEY.to_string(),
            RateLimitKeyStrategy::ClientIp => ctx.client_addr().ip().to_string(),
        }
    }
}

impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        let key = self.key(&ctx);

        match self.limiter.check(&key) {
            Admission::Admitted => next.run(ctx, request),
            Admission::Rejected { retry_after } => {
                tracing::warn!(client = %key, "Rate limit exceeded");
                metrics::record_rate_limited(&key);
                async move { GatewayError::RateLimited { retry_after }.into_response() }.boxed()
            }
        }
    }
}
