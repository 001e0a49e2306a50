//! Keyed GCRA limiter.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::response::Response;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use tokio::task::JoinHandle;

use crate::{Global, ThrottlerError, ThrottlerResult, TRACING_TARGET_THROTTLER, VaryBy};

type KeyedLimiter =
    RateLimiter<String, DashMapStateStore<String>, DefaultClock, StateInformationMiddleware>;

/// Renders a limited request.
pub type DeniedHandler = Arc<dyn Fn(&Request, &Decision) -> Response + Send + Sync>;

/// Renders a key extraction failure.
pub type ErrorHandler = Arc<dyn Fn(&ThrottlerError) -> Response + Send + Sync>;

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Burst size of the quota.
    pub limit: u32,
    /// Requests left before the limit is hit.
    pub remaining: u32,
    /// Time until the bucket is full again.
    pub reset_after: Duration,
    /// Time until the next request is allowed, set for denied requests.
    pub retry_after: Option<Duration>,
}

/// Shared rate limiter.
#[derive(Clone)]
pub struct Throttler {
    limiter: Arc<KeyedLimiter>,
    clock: DefaultClock,
    quota: Quota,
    vary_by: Arc<dyn VaryBy>,
    pub(crate) denied_handler: Option<DeniedHandler>,
    pub(crate) error_handler: Option<ErrorHandler>,
}

impl Throttler {
    /// Creates a limiter for `quota`, with one shared bucket.
    pub fn new(quota: Quota) -> Self {
        let clock = DefaultClock::default();
        Self {
            limiter: Arc::new(Self::build(quota, &clock)),
            clock,
            quota,
            vary_by: Arc::new(Global),
            denied_handler: None,
            error_handler: None,
        }
    }

    /// Allows `requests` per second.
    pub fn per_second(requests: u32) -> ThrottlerResult<Self> {
        let requests = NonZeroU32::new(requests).ok_or(ThrottlerError::InvalidQuota("rate is zero"))?;
        Ok(Self::new(Quota::per_second(requests)))
    }

    /// Allows `requests` per minute.
    pub fn per_minute(requests: u32) -> ThrottlerResult<Self> {
        let requests = NonZeroU32::new(requests).ok_or(ThrottlerError::InvalidQuota("rate is zero"))?;
        Ok(Self::new(Quota::per_minute(requests)))
    }

    /// Allows `requests` evenly spread over `period`.
    pub fn per_period(requests: u32, period: Duration) -> ThrottlerResult<Self> {
        let burst = NonZeroU32::new(requests).ok_or(ThrottlerError::InvalidQuota("rate is zero"))?;
        let quota = Quota::with_period(period / requests)
            .ok_or(ThrottlerError::InvalidQuota("period is zero"))?
            .allow_burst(burst);
        Ok(Self::new(quota))
    }

    /// Sets how many requests may arrive at once.
    ///
    /// Rebuilds the limiter, so call it before sharing the throttler.
    pub fn with_burst(mut self, burst: u32) -> ThrottlerResult<Self> {
        let burst = NonZeroU32::new(burst).ok_or(ThrottlerError::InvalidQuota("burst is zero"))?;
        self.quota = self.quota.allow_burst(burst);
        self.limiter = Arc::new(Self::build(self.quota, &self.clock));
        Ok(self)
    }

    /// Sets the request key.
    pub fn with_vary_by(mut self, vary_by: impl VaryBy) -> Self {
        self.vary_by = Arc::new(vary_by);
        self
    }

    /// Replaces the default `429 limit exceeded` response.
    pub fn with_denied_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request, &Decision) -> Response + Send + Sync + 'static,
    {
        self.denied_handler = Some(Arc::new(handler));
        self
    }

    /// Replaces the default `500` response for key errors.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ThrottlerError) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    fn build(quota: Quota, clock: &DefaultClock) -> KeyedLimiter {
        RateLimiter::dashmap_with_clock(quota, clock).with_middleware::<StateInformationMiddleware>()
    }

    /// Returns the quota.
    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Returns the key for `request`.
    pub fn key(&self, request: &Request) -> ThrottlerResult<String> {
        self.vary_by.key(request)
    }

    /// Takes one cell from the bucket of `key`.
    pub fn check(&self, key: &str) -> Decision {
        let limit = self.quota.burst_size().get();
        let interval = self.quota.replenish_interval();

        match self.limiter.check_key(&key.to_owned()) {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity();
                Decision {
                    allowed: true,
                    limit,
                    remaining,
                    reset_after: interval * (limit - remaining),
                    retry_after: None,
                }
            }
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                Decision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    reset_after: wait + interval * (limit - 1),
                    retry_after: Some(wait),
                }
            }
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    /// Returns whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.limiter.is_empty()
    }

    /// Drops keys whose buckets are full again.
    pub fn cleanup(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();

        tracing::debug!(
            target: TRACING_TARGET_THROTTLER,
            before,
            after = self.limiter.len(),
            "Rate limiter keys cleaned up"
        );
    }

    /// Runs [`Throttler::cleanup`] every `interval` on the tokio runtime.
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let throttler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                throttler.cleanup();
            }
        })
    }
}

impl fmt::Debug for Throttler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttler")
            .field("quota", &self.quota)
            .field("keys", &self.limiter.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_quota() {
        assert!(Throttler::per_second(0).is_err());
        assert!(Throttler::per_minute(0).is_err());
        assert!(Throttler::per_period(0, Duration::from_secs(1)).is_err());
        assert!(Throttler::per_period(1, Duration::ZERO).is_err());
    }

    #[test]
    fn test_decisions() -> anyhow::Result<()> {
        let throttler = Throttler::per_minute(2)?;

        let first = throttler.check("a");
        assert!(first.allowed);
        assert_eq!(first.limit, 2);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.retry_after, None);

        let second = throttler.check("a");
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = throttler.check("a");
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert!(third.retry_after.is_some_and(|wait| wait > Duration::ZERO));

        assert!(throttler.check("b").allowed);
        assert_eq!(throttler.len(), 2);

        Ok(())
    }

    #[test]
    fn test_burst() -> anyhow::Result<()> {
        let throttler = Throttler::per_minute(1)?.with_burst(3)?;
        assert_eq!(throttler.quota().burst_size().get(), 3);

        for _ in 0..3 {
            assert!(throttler.check("").allowed);
        }
        assert!(!throttler.check("").allowed);

        Ok(())
    }

    #[test]
    fn test_per_period() -> anyhow::Result<()> {
        let throttler = Throttler::per_period(10, Duration::from_secs(10))?;
        assert_eq!(throttler.quota().burst_size().get(), 10);
        assert_eq!(throttler.quota().replenish_interval(), Duration::from_secs(1));

        Ok(())
    }
}
