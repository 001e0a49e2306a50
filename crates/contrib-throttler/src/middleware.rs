//! Rate limiting middleware and router extension.

use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};

use crate::{Decision, TRACING_TARGET_THROTTLER, Throttler};

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

fn ceil_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn set_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(ceil_seconds(decision.reset_after)),
    );
    if let Some(retry_after) = decision.retry_after {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(ceil_seconds(retry_after)));
    }
}

/// Charges one cell per request and stops requests over the limit.
pub async fn rate_limit(State(throttler): State<Throttler>, request: Request, next: Next) -> Response {
    let key = match throttler.key(&request) {
        Ok(key) => key,
        Err(error) => {
            tracing::error!(
                target: TRACING_TARGET_THROTTLER,
                error = %error,
                "Failed to build rate limit key"
            );
            return match &throttler.error_handler {
                Some(handler) => handler(&error),
                None => error.into_response(),
            };
        }
    };

    let decision = throttler.check(&key);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(
            target: TRACING_TARGET_THROTTLER,
            key = %key,
            path = %request.uri().path(),
            retry_after = ?decision.retry_after,
            "Rate limit exceeded"
        );
        match &throttler.denied_handler {
            Some(handler) => handler(&request, &decision),
            None => (StatusCode::TOO_MANY_REQUESTS, "limit exceeded").into_response(),
        }
    };

    set_headers(response.headers_mut(), &decision);
    response
}

/// Extension trait for `axum::`[`Router`] to apply rate limiting.
pub trait RouterThrottlerExt<S> {
    /// Layers the [`rate_limit`] middleware.
    fn with_throttler(self, throttler: Throttler) -> Self;
}

impl<S> RouterThrottlerExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_throttler(self, throttler: Throttler) -> Self {
        tracing::debug!(
            target: TRACING_TARGET_THROTTLER,
            quota = ?throttler.quota(),
            "Applying rate limit layer"
        );
        self.layer(from_fn_with_state(throttler, rate_limit))
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use axum_test::TestServer;

    use super::*;
    use crate::{ByHeader, ByRemoteIp, ThrottlerError};

    fn server(throttler: Throttler) -> anyhow::Result<TestServer> {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_throttler(throttler);
        Ok(TestServer::new(router)?)
    }

    #[test]
    fn test_ceil_seconds() {
        assert_eq!(ceil_seconds(Duration::ZERO), 0);
        assert_eq!(ceil_seconds(Duration::from_millis(1)), 1);
        assert_eq!(ceil_seconds(Duration::from_secs(2)), 2);
        assert_eq!(ceil_seconds(Duration::from_millis(2001)), 3);
    }

    #[tokio::test]
    async fn test_limit_and_headers() -> anyhow::Result<()> {
        let server = server(Throttler::per_minute(2)?)?;

        let response = server.get("/").await;
        response.assert_status_ok();
        response.assert_header(X_RATELIMIT_LIMIT, "2");
        response.assert_header(X_RATELIMIT_REMAINING, "1");
        response.assert_header(X_RATELIMIT_RESET, "30");
        assert!(!response.headers().contains_key(header::RETRY_AFTER));

        let response = server.get("/").await;
        response.assert_status_ok();
        response.assert_header(X_RATELIMIT_REMAINING, "0");

        let response = server.get("/").await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        response.assert_text("limit exceeded");
        response.assert_header(X_RATELIMIT_REMAINING, "0");

        let retry_after: u64 = response.header(header::RETRY_AFTER).to_str()?.parse()?;
        assert!(retry_after > 0 && retry_after <= 30);

        Ok(())
    }

    #[tokio::test]
    async fn test_vary_by_header() -> anyhow::Result<()> {
        let throttler = Throttler::per_minute(1)?.with_vary_by(ByHeader::from_static("x-api-key"));
        let server = server(throttler)?;

        server.get("/").add_header("x-api-key", "a").await.assert_status_ok();
        server
            .get("/")
            .add_header("x-api-key", "a")
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
        server.get("/").add_header("x-api-key", "b").await.assert_status_ok();

        Ok(())
    }

    #[tokio::test]
    async fn test_key_error() -> anyhow::Result<()> {
        let server = server(Throttler::per_minute(1)?.with_vary_by(ByRemoteIp))?;

        let response = server.get("/").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let response = server.get("/").add_header("x-real-ip", "10.0.0.1").await;
        response.assert_status_ok();

        Ok(())
    }

    #[tokio::test]
    async fn test_custom_handlers() -> anyhow::Result<()> {
        let throttler = Throttler::per_minute(1)?
            .with_vary_by(|request: &Request| {
                request
                    .headers()
                    .get("x-user")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned)
                    .ok_or(ThrottlerError::MissingKey("x-user"))
            })
            .with_denied_handler(|_, decision| {
                (StatusCode::SERVICE_UNAVAILABLE, format!("slow down {}", decision.limit))
                    .into_response()
            })
            .with_error_handler(|_| StatusCode::BAD_REQUEST.into_response());
        let server = server(throttler)?;

        server.get("/").await.assert_status_bad_request();
        server.get("/").add_header("x-user", "u").await.assert_status_ok();

        let response = server.get("/").add_header("x-user", "u").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        response.assert_text("slow down 1");
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        Ok(())
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_keys() -> anyhow::Result<()> {
        let throttler = Throttler::per_minute(1)?.with_vary_by(ByHeader::from_static("x-api-key"));
        let server = server(throttler.clone())?;

        server.get("/").add_header("x-api-key", "a").await.assert_status_ok();
        assert_eq!(throttler.len(), 1);

        throttler.cleanup();
        assert_eq!(throttler.len(), 1);

        let handle = throttler.spawn_cleanup(Duration::from_millis(10));
        handle.abort();

        Ok(())
    }
}
