//! Request event rendering.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use jiff::fmt::strtime;
use jiff::tz::TimeZone;
use jiff::{Timestamp, Zoned};
use tracing::Span;

use crate::{
    LoggerConfig, LoggerError, LoggerResult, RequestError, RequestInfo, TRACING_TARGET_REQUEST,
};

/// Hook returning a span whose fields are attached to the request event.
///
/// The event is emitted inside the returned span, so subscribers render its
/// fields as structured context, e.g.
/// `|info, _| tracing::info_span!("request", tenant = %tenant_of(info))`.
pub type ContextFn = Arc<dyn Fn(&RequestInfo, &Response) -> Span + Send + Sync>;

/// Request logger state.
#[derive(Clone)]
pub struct RequestLogger {
    config: Arc<LoggerConfig>,
    context: Option<ContextFn>,
}

impl RequestLogger {
    /// Creates a logger, checking the time format up front.
    pub fn new(config: LoggerConfig) -> LoggerResult<Self> {
        if let Some(format) = &config.time_format {
            let probe = Zoned::now().with_time_zone(TimeZone::UTC);
            strtime::format(format, &probe).map_err(|source| LoggerError::InvalidTimeFormat {
                format: format.clone(),
                source,
            })?;
        }

        Ok(Self {
            config: Arc::new(config),
            context: None,
        })
    }

    /// Adds fields computed from the request and the response.
    pub fn with_context<F>(mut self, context: F) -> Self
    where
        F: Fn(&RequestInfo, &Response) -> Span + Send + Sync + 'static,
    {
        self.context = Some(Arc::new(context));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Formats `at` with the configured pattern and zone.
    pub fn format_time(&self, at: Timestamp) -> Option<String> {
        let format = self.config.time_format.as_deref()?;
        let zone = if self.config.utc {
            TimeZone::UTC
        } else {
            TimeZone::system()
        };
        strtime::format(format, &at.to_zoned(zone)).ok()
    }

    pub(crate) fn emit(&self, info: &RequestInfo, response: &Response, latency: Duration) {
        let config = &self.config;

        let status = config.status.then(|| response.status().as_u16());
        let method = config.method.then_some(info.method.as_str());
        let path = config.path.then_some(info.path.as_str());
        let query = info.query.as_deref().filter(|_| config.query);
        let ip = info.ip.as_deref().filter(|_| config.ip);
        let user_agent = info.user_agent.as_deref().filter(|_| config.user_agent);
        let time = self.format_time(Timestamp::now());
        let span = self
            .context
            .as_ref()
            .map_or_else(Span::none, |context| context(info, response));
        let _entered = span.enter();

        macro_rules! event {
            ($level:ident, $($rest:tt)+) => {
                tracing::$level!(
                    target: TRACING_TARGET_REQUEST,
                    status,
                    method,
                    path,
                    query,
                    ip,
                    user_agent,
                    latency = ?latency,
                    time = time.as_deref(),
                    $($rest)+
                )
            };
        }

        match response.extensions().get::<RequestError>() {
            Some(error) => event!(error, error = error.message(), "Request failed"),
            None => event!(info, "Request completed"),
        }
    }
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("config", &self.config)
            .field("context", &self.context.is_some())
            .finish()
    }
}
