//! Request counter and latency histogram.

use std::fmt;
use std::time::Duration;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{PrometheusError, PrometheusResult, TRACING_TARGET_PROMETHEUS};

/// Latency buckets in seconds used by [`Prometheus::new`].
pub const DEFAULT_BUCKETS: [f64; 3] = [0.3, 1.2, 5.0];

const REQUESTS_NAME: &str = "http_requests_total";
const REQUESTS_HELP: &str =
    "How many HTTP requests processed, partitioned by status code, method and HTTP path.";

const LATENCY_NAME: &str = "http_request_duration_seconds";
const LATENCY_HELP: &str =
    "How long it took to process the request, partitioned by status code, method and HTTP path.";

const LABELS: [&str; 3] = ["code", "method", "path"];

/// Request metrics for one service.
///
/// Cheap to clone; clones record into the same collectors.
#[derive(Clone)]
pub struct Prometheus {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
    matched_path: bool,
}

impl Prometheus {
    /// Registers the collectors in a new registry with the default buckets.
    pub fn new(service: &str) -> PrometheusResult<Self> {
        Self::with_buckets(service, DEFAULT_BUCKETS.to_vec())
    }

    /// Registers the collectors in a new registry with custom buckets.
    pub fn with_buckets(service: &str, buckets: Vec<f64>) -> PrometheusResult<Self> {
        Self::register(service, buckets, Registry::new())
    }

    /// Registers the collectors in `registry`.
    ///
    /// Fails when the buckets are not strictly increasing, or when the
    /// registry already holds collectors with the same names and labels.
    pub fn register(service: &str, buckets: Vec<f64>, registry: Registry) -> PrometheusResult<Self> {
        if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(PrometheusError::InvalidBuckets(buckets));
        }

        let requests = IntCounterVec::new(
            Opts::new(REQUESTS_NAME, REQUESTS_HELP).const_label("service", service),
            &LABELS,
        )?;

        let latency = HistogramVec::new(
            HistogramOpts::new(LATENCY_NAME, LATENCY_HELP)
                .const_label("service", service)
                .buckets(buckets),
            &LABELS,
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        tracing::debug!(target: TRACING_TARGET_PROMETHEUS, service, "Registered request metrics");

        Ok(Self {
            registry,
            requests,
            latency,
            matched_path: true,
        })
    }

    /// Labels requests with the raw path instead of the route template.
    pub fn with_raw_paths(mut self) -> Self {
        self.matched_path = false;
        self
    }

    /// Returns whether the route template is used as the `path` label.
    pub fn uses_matched_path(&self) -> bool {
        self.matched_path
    }

    /// Returns the registry holding the collectors.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records one request.
    pub fn observe(&self, status: StatusCode, method: &str, path: &str, elapsed: Duration) {
        let code = status.as_str();
        let labels = [code, method, path];

        self.requests.with_label_values(&labels).inc();
        self.latency
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
    }

    /// Renders every metric of the registry in the text exposition format.
    pub fn render(&self) -> PrometheusResult<String> {
        let families = self.registry.gather();
        Ok(TextEncoder::new().encode_to_string(&families)?)
    }

    /// Renders the metrics as an HTTP response.
    pub fn response(&self) -> Response {
        match self.render() {
            Ok(body) => {
                let content_type = HeaderValue::from_static(prometheus::TEXT_FORMAT);
                ([(header::CONTENT_TYPE, content_type)], body).into_response()
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_PROMETHEUS,
                    error = %error,
                    "Failed to encode metrics"
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl fmt::Debug for Prometheus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prometheus")
            .field("matched_path", &self.matched_path)
            .finish_non_exhaustive()
    }
}
