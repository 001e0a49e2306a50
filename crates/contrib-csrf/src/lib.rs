#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for token checks.
pub const TRACING_TARGET_CSRF: &str = "contrib_csrf::middleware";

mod config;
mod error;
mod middleware;
mod store;
mod token;

pub use crate::config::{CookieSameSite, CsrfConfig};
pub use crate::error::{CsrfError, CsrfResult};
pub use crate::middleware::{Csrf, ErrorHandler, RouterCsrfExt, protect};
pub use crate::token::{CsrfToken, failure_reason, skip_check, template_field, token};
