//! Token extraction and validation errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::Algorithm;

/// Errors raised while extracting or validating a token.
///
/// The display text is what the default error handler sends to the client.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum JwtError {
    /// The `Authorization` header is present but not `Bearer <token>`.
    #[error("Authorization header format must be Bearer {{token}}")]
    MalformedHeader,

    /// No token was found and credentials are required.
    #[error("Required authorization token not found")]
    MissingToken,

    /// A custom extractor failed.
    #[error("{0}")]
    Extraction(String),

    /// The token was signed with a different algorithm than configured.
    #[error("Expected {expected:?} signing method but token specified {actual:?}")]
    UnexpectedAlgorithm {
        /// Configured algorithm.
        expected: Algorithm,
        /// Algorithm in the token header.
        actual: Algorithm,
    },

    /// No key is available for the token.
    #[error("{0}")]
    Key(String),

    /// The token failed to decode or verify.
    #[error(transparent)]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for JwtError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

/// Specialized [`Result`] type for token handling.
pub type JwtResult<T, E = JwtError> = Result<T, E>;
