//! Logging and recovery middleware with the router extension.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::Response;
use futures::FutureExt;
use jiff::Timestamp;

use crate::recovery::RequestHead;
use crate::{Recovery, RequestError, RequestInfo, RequestLogger, TRACING_TARGET_PANIC};

/// Emits one event per completed request.
pub async fn log_request(
    State(logger): State<RequestLogger>,
    request: Request,
    next: Next,
) -> Response {
    if logger.config().is_skipped(request.uri().path()) {
        return next.run(request).await;
    }

    let info = RequestInfo::new(&request);
    let start = Instant::now();
    let response = next.run(request).await;
    logger.emit(&info, &response, start.elapsed());

    response
}

/// Turns handler panics into responses.
///
/// The response carries a [`RequestError`] so an outer request logger reports
/// it at error level.
pub async fn recover(State(recovery): State<Recovery>, request: Request, next: Next) -> Response {
    let head = RequestHead::new(&request);

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let report = recovery.report(panic.as_ref(), &head);

            tracing::error!(
                target: TRACING_TARGET_PANIC,
                time = %Timestamp::now(),
                error = %report.message,
                request = %report.request,
                stack = report.backtrace.as_deref(),
                "Recovery from panic"
            );

            let mut response = recovery.respond(&report);
            response
                .extensions_mut()
                .insert(RequestError::new(report.message));
            response
        }
    }
}

/// Extension trait for `axum::`[`Router`] to add logging and recovery.
pub trait RouterLoggerExt<S> {
    /// Layers [`log_request`] over every route.
    fn with_request_logger(self, logger: RequestLogger) -> Self;

    /// Layers [`recover`] over every route.
    fn with_recovery(self, recovery: Recovery) -> Self;
}

impl<S> RouterLoggerExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_request_logger(self, logger: RequestLogger) -> Self {
        self.layer(from_fn_with_state(logger, log_request))
    }

    fn with_recovery(self, recovery: Recovery) -> Self {
        self.layer(from_fn_with_state(recovery, recover))
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use axum::http::{HeaderValue, StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum_test::TestServer;

    use super::*;
    use crate::LoggerConfig;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            let buffer = self.0.lock().map(|buffer| buffer.clone()).unwrap_or_default();
            String::from_utf8_lossy(&buffer).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Ok(mut buffer) = self.0.lock() {
                buffer.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture() -> (Capture, tracing::subscriber::DefaultGuard) {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    fn router() -> anyhow::Result<Router> {
        let logger = RequestLogger::new(
            LoggerConfig::default()
                .with_skip_paths(["/health"])
                .with_time_format("%Y")
                .with_utc(true),
        )?
        .with_context(|info, response| {
            tracing::info_span!(
                "request_context",
                agent = %info.user_agent.as_deref().unwrap_or_default(),
                cached = response.headers().contains_key(header::AGE),
            )
        });

        Ok(Router::new()
            .route("/", get(|| async { "index" }))
            .route("/health", get(|| async { "ok" }))
            .route(
                "/failed",
                get(|| async {
                    (
                        StatusCode::BAD_GATEWAY,
                        RequestError::new("upstream timed out"),
                        "bad gateway",
                    )
                        .into_response()
                }),
            )
            .route(
                "/panic",
                get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            )
            .with_recovery(Recovery::new(false))
            .with_request_logger(logger))
    }

    #[tokio::test]
    async fn test_logs_completed_request() -> anyhow::Result<()> {
        let (capture, _guard) = capture();
        let server = TestServer::new(router()?)?;

        server
            .get("/")
            .add_query_param("page", "2")
            .add_header(header::USER_AGENT, HeaderValue::from_static("contrib-test"))
            .await
            .assert_status_ok();

        let logs = capture.contents();
        assert!(logs.contains("INFO"));
        assert!(logs.contains("Request completed"));
        assert!(logs.contains("status=200"));
        assert!(logs.contains("method=\"GET\"") || logs.contains("method=GET"));
        assert!(logs.contains("page=2"));
        assert!(logs.contains("agent=contrib-test"));
        assert!(logs.contains("request_context{"));
        assert!(logs.contains("cached=false"));

        Ok(())
    }

    #[tokio::test]
    async fn test_skip_paths() -> anyhow::Result<()> {
        let (capture, _guard) = capture();
        let server = TestServer::new(router()?)?;

        server.get("/health").await.assert_status_ok();
        assert!(!capture.contents().contains("Request completed"));

        Ok(())
    }

    #[tokio::test]
    async fn test_request_error_logged_at_error_level() -> anyhow::Result<()> {
        let (capture, _guard) = capture();
        let server = TestServer::new(router()?)?;

        server
            .get("/failed")
            .await
            .assert_status(StatusCode::BAD_GATEWAY);

        let logs = capture.contents();
        assert!(logs.contains("ERROR"));
        assert!(logs.contains("Request failed"));
        assert!(logs.contains("upstream timed out"));

        Ok(())
    }

    #[tokio::test]
    async fn test_recovery() -> anyhow::Result<()> {
        let (capture, _guard) = capture();
        let server = TestServer::new(router()?)?;

        let response = server.get("/panic").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let logs = capture.contents();
        assert!(logs.contains("Recovery from panic"));
        assert!(logs.contains("handler exploded"));
        assert!(logs.contains("GET /panic"));
        assert!(logs.contains("Request failed"));

        Ok(())
    }

    #[tokio::test]
    async fn test_custom_recovery_handler() -> anyhow::Result<()> {
        let recovery = Recovery::new(true).with_handler(|report| {
            let has_stack = report.backtrace.is_some();
            (StatusCode::SERVICE_UNAVAILABLE, format!("{}:{has_stack}", report.message))
                .into_response()
        });

        let router = Router::new()
            .route(
                "/",
                get(|| async {
                    if true {
                        panic!("boom");
                    }
                    "unreachable"
                }),
            )
            .with_recovery(recovery);
        let server = TestServer::new(router)?;

        let response = server.get("/").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        response.assert_text("boom:true");

        Ok(())
    }
}
