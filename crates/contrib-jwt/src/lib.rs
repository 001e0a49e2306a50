#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for token extraction and validation.
pub const TRACING_TARGET_JWT: &str = "contrib_jwt::middleware";

mod config;
mod error;
mod extractor;
mod middleware;
mod token;

pub use jsonwebtoken::{Algorithm, DecodingKey, Header};

pub use crate::config::{ErrorHandler, JwtConfig, JwtSettings, KeyGetter};
pub use crate::error::{JwtError, JwtResult};
pub use crate::extractor::TokenExtractor;
pub use crate::middleware::{Jwt, RouterJwtExt, check_jwt};
pub use crate::token::{Token, get};
