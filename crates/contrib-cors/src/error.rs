//! Errors raised while turning a [`CorsConfig`] into a policy.
//!
//! [`CorsConfig`]: crate::CorsConfig

/// Configuration errors for the CORS middleware.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum CorsError {
    /// An allowed origin is not a valid header value or has more than one wildcard.
    #[error("invalid allowed origin: {0}")]
    InvalidOrigin(String),

    /// An allowed method is not a valid HTTP method.
    #[error("invalid allowed method: {0}")]
    InvalidMethod(String),

    /// An allowed or exposed header is not a valid header name.
    #[error("invalid header name: {0}")]
    InvalidHeader(String),

    /// Credentials cannot be combined with an explicit `*` origin.
    #[error("credentials cannot be allowed together with a wildcard origin")]
    CredentialsWithAnyOrigin,

    /// Credentials cannot be combined with a wildcard list of exposed headers.
    #[error("credentials cannot be allowed together with wildcard exposed headers")]
    CredentialsWithWildcard,
}

/// Specialized [`Result`] type for CORS configuration.
pub type CorsResult<T, E = CorsError> = Result<T, E>;
