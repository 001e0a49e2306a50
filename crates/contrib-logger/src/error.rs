//! Logger configuration errors.

/// Errors raised while building a [`RequestLogger`].
///
/// [`RequestLogger`]: crate::RequestLogger
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum LoggerError {
    /// The strftime pattern cannot be rendered.
    #[error("invalid time format {format:?}: {source}")]
    InvalidTimeFormat {
        format: String,
        #[source]
        source: jiff::Error,
    },
}

/// Specialized [`Result`] type for logger configuration.
pub type LoggerResult<T, E = LoggerError> = Result<T, E>;
