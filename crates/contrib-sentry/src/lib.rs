#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for SDK setup and captured panics.
pub const TRACING_TARGET_SENTRY: &str = "contrib_sentry::recovery";

mod config;
mod error;
mod recovery;

pub use sentry::{ClientInitGuard, Hub};

pub use crate::config::SentryConfig;
pub use crate::error::{SentryError, SentryResult};
pub use crate::recovery::{PanicHandler, RouterSentryExt, SentryRecovery, capture_panics};
