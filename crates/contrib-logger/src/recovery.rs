//! Panic capture and reporting.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt::{self, Write};
use std::sync::{Arc, Once};

use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode, Uri, Version, header};
use axum::response::{IntoResponse, Response};

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a panic hook that keeps the backtrace of the last panic on the
/// panicking thread.
fn install_backtrace_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

fn take_backtrace() -> Option<String> {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .map(|backtrace| backtrace.to_string())
}

/// Renders a recovered panic.
pub type RecoveryHandler = Arc<dyn Fn(&PanicReport) -> Response + Send + Sync>;

/// Details of a recovered panic.
#[derive(Debug, Clone)]
pub struct PanicReport {
    /// Panic payload rendered as text.
    pub message: String,
    /// Request line and headers, credentials masked.
    pub request: String,
    /// Backtrace captured at the panic site, when enabled.
    pub backtrace: Option<String>,
}

/// Panic recovery state.
#[derive(Clone)]
pub struct Recovery {
    stack: bool,
    handler: Option<RecoveryHandler>,
}

impl Recovery {
    /// Creates the recovery, capturing backtraces when `stack` is set.
    pub fn new(stack: bool) -> Self {
        if stack {
            install_backtrace_hook();
        }

        Self {
            stack,
            handler: None,
        }
    }

    /// Replaces the default `500 Internal Server Error` response.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PanicReport) -> Response + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Returns whether backtraces are captured.
    pub fn stack(&self) -> bool {
        self.stack
    }

    pub(crate) fn report(&self, panic: &(dyn Any + Send), request: &RequestHead) -> PanicReport {
        PanicReport {
            message: panic_message(panic),
            request: request.to_string(),
            backtrace: if self.stack { take_backtrace() } else { None },
        }
    }

    pub(crate) fn respond(&self, report: &PanicReport) -> Response {
        match &self.handler {
            Some(handler) => handler(report),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recovery")
            .field("stack", &self.stack)
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

/// Request line and headers kept for the panic dump.
#[derive(Debug, Clone)]
pub(crate) struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

impl RequestHead {
    pub(crate) fn new(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }
}

impl fmt::Display for RequestHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self
            .uri
            .path_and_query()
            .map_or("/", |path_and_query| path_and_query.as_str());
        write!(f, "{} {} {:?}\r\n", self.method, target, self.version)?;
        for (name, value) in &self.headers {
            let masked = name == header::AUTHORIZATION
                || name == header::PROXY_AUTHORIZATION
                || name == header::COOKIE;
            f.write_str(name.as_str())?;
            f.write_str(": ")?;
            if masked {
                f.write_char('*')?;
            } else {
                f.write_str(&String::from_utf8_lossy(value.as_bytes()))?;
            }
            f.write_str("\r\n")?;
        }
        Ok(())
    }
}
