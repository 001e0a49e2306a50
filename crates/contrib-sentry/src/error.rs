//! SDK configuration errors.

/// Errors raised while initializing the SDK.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum SentryError {
    /// The DSN cannot be parsed.
    #[error("invalid sentry DSN: {0}")]
    InvalidDsn(#[from] sentry::types::ParseDsnError),

    /// The sample rate is outside `0.0..=1.0`.
    #[error("sample rate must be between 0 and 1, got {0}")]
    InvalidSampleRate(f32),
}

/// Specialized [`Result`] type for SDK setup.
pub type SentryResult<T, E = SentryError> = Result<T, E>;
