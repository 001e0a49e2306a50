//! Verification errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Reasons a captcha check fails.
///
/// The display text is what the default error handler sends to the client.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum RecaptchaError {
    /// The request carried no captcha response.
    #[error("captcha response not found")]
    ResponseNotFound,

    /// The middleware was built with an empty secret.
    #[error("no secret is given")]
    MissingSecret,

    /// The request body could not be read.
    #[error("{0}")]
    Extraction(String),

    /// The verify endpoint could not be reached.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// The verify endpoint answered with something other than the expected JSON.
    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    /// Google rejected the captcha response.
    #[error("google verification response failed")]
    VerificationFailed {
        /// Error codes reported by the endpoint.
        error_codes: Vec<String>,
    },
}

impl IntoResponse for RecaptchaError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

/// Specialized [`Result`] type for captcha verification.
pub type RecaptchaResult<T, E = RecaptchaError> = Result<T, E>;
