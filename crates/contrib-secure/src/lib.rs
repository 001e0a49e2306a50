#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for host checks, redirects and header decisions.
pub const TRACING_TARGET_SECURE: &str = "contrib_secure::middleware";

mod config;
mod error;
mod middleware;
mod nonce;

pub use crate::config::{NONCE_PLACEHOLDER, ReferrerPolicy, SecureConfig};
pub use crate::error::{SecureError, SecureResult};
pub use crate::middleware::{BadHostHandler, RouterSecureExt, Secure, secure_headers};
pub use crate::nonce::{CspNonce, csp_nonce};
