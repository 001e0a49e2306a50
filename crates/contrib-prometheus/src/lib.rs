#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for metric registration and export.
pub const TRACING_TARGET_PROMETHEUS: &str = "contrib_prometheus::metrics";

mod error;
mod metrics;
mod middleware;

pub use prometheus::Registry;

pub use crate::error::{PrometheusError, PrometheusResult};
pub use crate::metrics::{DEFAULT_BUCKETS, Prometheus};
pub use crate::middleware::{RouterPrometheusExt, metrics, track_metrics};
