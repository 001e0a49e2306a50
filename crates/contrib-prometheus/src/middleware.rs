//! Recording middleware, export handler and router extension.

use std::time::Instant;

use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::Response;
use axum::routing::get;

use crate::Prometheus;

/// Counts and times every request.
pub async fn track_metrics(
    State(prometheus): State<Prometheus>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let matched = prometheus
        .uses_matched_path()
        .then(|| request.extensions().get::<MatchedPath>())
        .flatten()
        .map(|path| path.as_str().to_owned());
    let path = matched.unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;
    prometheus.observe(response.status(), method.as_str(), &path, start.elapsed());

    response
}

/// Serves the metrics in the text exposition format.
pub async fn metrics(State(prometheus): State<Prometheus>) -> Response {
    prometheus.response()
}

/// Extension trait for `axum::`[`Router`] to record and export metrics.
pub trait RouterPrometheusExt<S> {
    /// Layers [`track_metrics`] over every route added so far.
    fn with_prometheus(self, prometheus: Prometheus) -> Self;

    /// Serves the metrics at `path`.
    ///
    /// Routes added after [`with_prometheus`] are not recorded, so adding
    /// the endpoint last keeps scrapes out of the metrics.
    ///
    /// [`with_prometheus`]: RouterPrometheusExt::with_prometheus
    fn with_metrics_endpoint(self, path: &str, prometheus: Prometheus) -> Self;
}

impl<S> RouterPrometheusExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_prometheus(self, prometheus: Prometheus) -> Self {
        self.layer(from_fn_with_state(prometheus, track_metrics))
    }

    fn with_metrics_endpoint(self, path: &str, prometheus: Prometheus) -> Self {
        self.route(
            path,
            get(move || {
                let prometheus = prometheus.clone();
                async move { prometheus.response() }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{StatusCode, header};
    use axum_test::TestServer;

    use super::*;

    fn counter_line<'a>(text: &'a str, needle: &str) -> Option<&'a str> {
        text.lines()
            .find(|line| line.starts_with("http_requests_total{") && line.contains(needle))
    }

    #[tokio::test]
    async fn test_records_matched_path() -> anyhow::Result<()> {
        let prometheus = Prometheus::new("users")?;
        let router = Router::new()
            .route("/users/{id}", get(|| async { "user" }))
            .with_prometheus(prometheus.clone())
            .with_metrics_endpoint("/metrics", prometheus.clone());
        let server = TestServer::new(router)?;

        server.get("/users/1").await.assert_status_ok();
        server.get("/users/2").await.assert_status_ok();
        server.get("/missing").await.assert_status(StatusCode::NOT_FOUND);

        let response = server.get("/metrics").await;
        response.assert_status_ok();
        response.assert_header(header::CONTENT_TYPE, prometheus::TEXT_FORMAT);

        let text = response.text();
        let users = counter_line(&text, "path=\"/users/{id}\"").unwrap_or_default();
        assert!(users.contains("code=\"200\""));
        assert!(users.contains("method=\"GET\""));
        assert!(users.contains("service=\"users\""));
        assert!(users.ends_with(" 2"));

        let missing = counter_line(&text, "path=\"/missing\"").unwrap_or_default();
        assert!(missing.contains("code=\"404\""));

        assert!(counter_line(&text, "path=\"/metrics\"").is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_raw_paths() -> anyhow::Result<()> {
        let prometheus = Prometheus::new("users")?.with_raw_paths();
        let router = Router::new()
            .route("/users/{id}", get(|| async { "user" }))
            .with_prometheus(prometheus.clone());
        let server = TestServer::new(router)?;

        server.get("/users/7").await.assert_status_ok();

        let text = prometheus.render()?;
        assert!(counter_line(&text, "path=\"/users/7\"").is_some());

        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_handler() -> anyhow::Result<()> {
        let prometheus = Prometheus::new("api")?;
        let router = Router::new()
            .route("/metrics", get(metrics))
            .with_state(prometheus);
        let server = TestServer::new(router)?;

        let response = server.get("/metrics").await;
        response.assert_status_ok();
        // Vectors without observations export no samples yet.
        assert!(!response.text().contains("http_requests_total{"));

        Ok(())
    }
}
