//! Validation failures and configuration errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors raised by the CSRF middleware.
///
/// The display text of the validation variants is the body of the default
/// `403 Forbidden` response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum CsrfError {
    /// An HTTPS request with an unsafe method carried no `Referer`.
    #[error("referer not supplied")]
    NoReferer,

    /// The `Referer` is neither same-origin nor trusted.
    #[error("referer invalid")]
    BadReferer,

    /// No real token was available to compare against.
    ///
    /// The middleware issues a fresh token whenever the cookie is missing or
    /// invalid, so it reports a missing submission as [`CsrfError::BadToken`].
    #[error("CSRF token not found in request")]
    NoToken,

    /// The submitted token is missing, malformed or does not match the cookie.
    #[error("CSRF token invalid")]
    BadToken,

    /// The authentication key is too short.
    #[error("authentication key must be at least {min} bytes, got {len}")]
    WeakAuthKey {
        /// Minimum key length.
        min: usize,
        /// Supplied key length.
        len: usize,
    },
}

impl IntoResponse for CsrfError {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, self.to_string()).into_response()
    }
}

/// Specialized [`Result`] type for CSRF handling.
pub type CsrfResult<T, E = CsrfError> = Result<T, E>;
