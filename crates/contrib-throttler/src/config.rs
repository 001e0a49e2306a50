//! Quota settings.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{ByRemoteIp, Throttler, ThrottlerResult};

/// Rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct ThrottlerConfig {
    /// Requests allowed per period.
    #[cfg_attr(
        feature = "config",
        arg(long = "rate-limit-requests", env = "RATE_LIMIT_REQUESTS", default_value = "60")
    )]
    pub requests: u32,

    /// Period length in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "rate-limit-period", env = "RATE_LIMIT_PERIOD", default_value = "60")
    )]
    pub period_seconds: u64,

    /// Requests allowed at once, defaults to `requests`.
    #[cfg_attr(feature = "config", arg(long = "rate-limit-burst", env = "RATE_LIMIT_BURST"))]
    #[serde(default)]
    pub burst: Option<u32>,

    /// Keys buckets by client address instead of sharing one.
    #[cfg_attr(feature = "config", arg(long = "rate-limit-by-ip", env = "RATE_LIMIT_BY_IP"))]
    #[serde(default)]
    pub by_ip: bool,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            requests: 60,
            period_seconds: 60,
            burst: None,
            by_ip: false,
        }
    }
}

impl ThrottlerConfig {
    /// Returns the period as a [`Duration`].
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    /// Builds the limiter.
    pub fn build(&self) -> ThrottlerResult<Throttler> {
        let mut throttler = Throttler::per_period(self.requests, self.period())?;
        if let Some(burst) = self.burst {
            throttler = throttler.with_burst(burst)?;
        }
        if self.by_ip {
            throttler = throttler.with_vary_by(ByRemoteIp);
        }
        Ok(throttler)
    }
}
