#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for limiter decisions.
pub const TRACING_TARGET_THROTTLER: &str = "contrib_throttler::middleware";

mod config;
mod error;
mod limiter;
mod middleware;
mod vary;

pub use crate::config::ThrottlerConfig;
pub use crate::error::{ThrottlerError, ThrottlerResult};
pub use crate::limiter::{Decision, DeniedHandler, ErrorHandler, Throttler};
pub use crate::middleware::{RouterThrottlerExt, rate_limit};
pub use crate::vary::{ByHeader, ByMany, ByPath, ByRemoteIp, Global, VaryBy};
