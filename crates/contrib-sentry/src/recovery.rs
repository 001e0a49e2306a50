//! Panic capture middleware and router extension.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use sentry::Hub;
use sentry::protocol::{Event, Exception, Level, Request as EventRequest, Uuid};

use crate::TRACING_TARGET_SENTRY;

/// Renders a captured panic from its message and event id.
pub type PanicHandler = Arc<dyn Fn(&str, Uuid) -> Response + Send + Sync>;

/// Panic reporting state.
#[derive(Clone, Default)]
pub struct SentryRecovery {
    hub: Option<Arc<Hub>>,
    handler: Option<PanicHandler>,
}

impl SentryRecovery {
    /// Reports to the hub current at capture time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports to `hub` instead of the current one.
    pub fn with_hub(mut self, hub: Arc<Hub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Replaces the default `500 Internal Server Error` response.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, Uuid) -> Response + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    fn capture(&self, event: Event<'static>) -> Uuid {
        match &self.hub {
            Some(hub) => hub.capture_event(event),
            None => Hub::with_active(|hub| hub.capture_event(event)),
        }
    }
}

impl fmt::Debug for SentryRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentryRecovery")
            .field("custom_hub", &self.hub.is_some())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|message| (*message).to_owned()))
        .unwrap_or_else(|| "unknown panic type".to_owned())
}

/// Builds the request interface of the event.
fn event_request(request: &Request) -> EventRequest {
    let uri = request.uri();
    let host = uri
        .authority()
        .map(|authority| authority.as_str())
        .or_else(|| {
            request
                .headers()
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
        })
        .unwrap_or("localhost");
    let scheme = uri.scheme_str().unwrap_or("http");
    let path = uri.path_and_query().map_or("/", |path| path.as_str());

    let headers = request
        .headers()
        .iter()
        .filter(|(name, _)| {
            *name != header::AUTHORIZATION
                && *name != header::COOKIE
                && *name != header::PROXY_AUTHORIZATION
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect();

    EventRequest {
        url: format!("{scheme}://{host}{path}").parse().ok(),
        method: Some(request.method().to_string()),
        query_string: uri.query().map(str::to_owned),
        headers,
        ..Default::default()
    }
}

fn panic_event(message: String, request: EventRequest) -> Event<'static> {
    Event {
        level: Level::Fatal,
        message: Some(message.clone()),
        exception: vec![Exception {
            ty: "panic".to_owned(),
            value: Some(message),
            ..Default::default()
        }]
        .into(),
        request: Some(request),
        ..Default::default()
    }
}

/// Captures handler panics as fatal events.
pub async fn capture_panics(
    State(recovery): State<SentryRecovery>,
    request: Request,
    next: Next,
) -> Response {
    let event_request = event_request(&request);

    let panic = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => return response,
        Err(panic) => panic,
    };

    let message = panic_message(panic.as_ref());
    let event_id = recovery.capture(panic_event(message.clone(), event_request));

    tracing::error!(
        target: TRACING_TARGET_SENTRY,
        error = %message,
        event_id = %event_id,
        "Captured handler panic"
    );

    match &recovery.handler {
        Some(handler) => handler(&message, event_id),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Extension trait for `axum::`[`Router`] to report panics.
pub trait RouterSentryExt<S> {
    /// Layers [`capture_panics`] over every route.
    fn with_sentry(self, recovery: SentryRecovery) -> Self;
}

impl<S> RouterSentryExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_sentry(self, recovery: SentryRecovery) -> Self {
        self.layer(from_fn_with_state(recovery, capture_panics))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum::routing::{get, post};
    use axum_test::TestServer;
    use sentry::test::TestTransport;
    use sentry::{ClientOptions, Scope};

    use super::*;

    fn hub() -> anyhow::Result<(Arc<Hub>, Arc<TestTransport>)> {
        let transport = TestTransport::new();
        let options = ClientOptions {
            dsn: Some("https://public@sentry.example.com/1".parse()?),
            transport: Some(Arc::new(transport.clone())),
            ..Default::default()
        };

        let hub = Hub::new(Some(Arc::new(options.into())), Arc::new(Scope::default()));
        Ok((Arc::new(hub), transport))
    }

    fn router(recovery: SentryRecovery) -> Router {
        Router::new()
            .route("/", get(|| async { "fine" }))
            .route(
                "/checkout",
                post(|| async {
                    if true {
                        panic!("payment provider unreachable");
                    }
                    "unreachable"
                }),
            )
            .with_sentry(recovery)
    }

    #[tokio::test]
    async fn test_no_panic() -> anyhow::Result<()> {
        let (hub, transport) = hub()?;
        let server = TestServer::new(router(SentryRecovery::new().with_hub(hub)))?;

        server.get("/").await.assert_text("fine");
        assert!(transport.fetch_and_clear_events().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_captures_panic() -> anyhow::Result<()> {
        let (hub, transport) = hub()?;
        let server = TestServer::new(router(SentryRecovery::new().with_hub(hub)))?;

        let response = server
            .post("/checkout")
            .add_query_param("step", "2")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"))
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let events = transport.fetch_and_clear_events();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.level, Level::Fatal);
        assert_eq!(event.message.as_deref(), Some("payment provider unreachable"));
        assert_eq!(event.exception.values[0].ty, "panic");

        let request = event.request.as_ref().ok_or_else(|| anyhow::anyhow!("no request"))?;
        assert_eq!(request.method.as_deref(), Some("POST"));
        assert_eq!(request.query_string.as_deref(), Some("step=2"));
        assert_eq!(request.url.as_ref().map(|url| url.path()), Some("/checkout"));
        assert!(!request.headers.contains_key("authorization"));

        Ok(())
    }

    #[tokio::test]
    async fn test_custom_handler() -> anyhow::Result<()> {
        let (hub, _transport) = hub()?;
        let recovery = SentryRecovery::new()
            .with_hub(hub)
            .with_handler(|message, _| (StatusCode::SERVICE_UNAVAILABLE, message.to_owned()).into_response());
        let server = TestServer::new(router(recovery))?;

        let response = server.post("/checkout").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        response.assert_text("payment provider unreachable");

        Ok(())
    }
}
