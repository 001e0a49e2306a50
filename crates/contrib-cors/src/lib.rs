#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for origin and preflight decisions.
pub const TRACING_TARGET_CORS: &str = "contrib_cors::middleware";

mod config;
mod error;
mod middleware;
mod policy;

pub use crate::config::CorsConfig;
pub use crate::error::{CorsError, CorsResult};
pub use crate::middleware::{RouterCorsExt, reject_disallowed};
pub use crate::policy::CorsPolicy;
