//! Errors raised while compiling a [`SecureConfig`].
//!
//! [`SecureConfig`]: crate::SecureConfig

/// Configuration errors for the security middleware.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum SecureError {
    /// An SSL proxy header name is not a valid header name.
    #[error("invalid proxy header name: {0}")]
    InvalidHeaderName(String),

    /// A configured header value contains characters not allowed in headers.
    #[error("invalid value for header {name}: {value}")]
    InvalidHeaderValue {
        /// Header the value was meant for.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Specialized [`Result`] type for security configuration.
pub type SecureResult<T, E = SecureError> = Result<T, E>;
