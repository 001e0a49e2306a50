//! Limiter configuration and key extraction errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors for the rate limiting middleware.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum ThrottlerError {
    /// A rate, burst, or period of zero.
    #[error("invalid quota: {0}")]
    InvalidQuota(&'static str),

    /// The request does not carry what the key is built from.
    #[error("cannot build rate limit key: {0}")]
    MissingKey(&'static str),
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Specialized [`Result`] type for rate limiting.
pub type ThrottlerResult<T, E = ThrottlerError> = Result<T, E>;
