//! Metric registration and export errors.

/// Errors raised by the metrics registry.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum PrometheusError {
    /// Invalid metric options or a duplicate registration.
    #[error("metrics registry error: {0}")]
    Registry(#[from] prometheus::Error),

    /// Histogram buckets must be strictly increasing.
    #[error("histogram buckets must be strictly increasing: {0:?}")]
    InvalidBuckets(Vec<f64>),
}

/// Specialized [`Result`] type for metric operations.
pub type PrometheusResult<T, E = PrometheusError> = Result<T, E>;
