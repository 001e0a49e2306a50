#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for captcha verification.
pub const TRACING_TARGET_RECAPTCHA: &str = "contrib_recaptcha::verify";

/// Field and header name the reCAPTCHA widget submits.
pub const RESPONSE_KEY: &str = "g-recaptcha-response";

/// Google's verification endpoint.
pub const DEFAULT_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

mod config;
mod error;
mod extractor;
mod middleware;
mod verify;

pub use crate::config::RecaptchaConfig;
pub use crate::error::{RecaptchaError, RecaptchaResult};
pub use crate::extractor::ResponseExtractor;
pub use crate::middleware::{ErrorHandler, Recaptcha, RouterRecaptchaExt, verify_captcha};
pub use crate::verify::VerifyResponse;
