#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for completed request events.
pub const TRACING_TARGET_REQUEST: &str = "contrib_logger::request";

/// Tracing target for recovered panics.
pub const TRACING_TARGET_PANIC: &str = "contrib_logger::panic";

mod config;
mod error;
mod logger;
mod middleware;
mod recovery;
mod request;

pub use crate::config::LoggerConfig;
pub use crate::error::{LoggerError, LoggerResult};
pub use crate::logger::{ContextFn, RequestLogger};
pub use crate::middleware::{RouterLoggerExt, log_request, recover};
pub use crate::recovery::{PanicReport, Recovery, RecoveryHandler};
pub use crate::request::{RequestError, RequestInfo, client_ip};
