//! Request details captured before the handler runs.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderMap, Method, header};
use axum::response::{IntoResponseParts, ResponseParts};

/// Request fields available to the logger after the handler consumed the
/// request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// Client address, see [`client_ip`].
    pub ip: Option<String>,
    /// `User-Agent` header.
    pub user_agent: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
}

impl RequestInfo {
    /// Captures the fields of `request`.
    pub fn new(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            path: request.uri().path().to_owned(),
            query: request.uri().query().map(str::to_owned),
            ip: client_ip(request),
            user_agent: request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
            headers: request.headers().clone(),
        }
    }
}

/// Returns the client address from `X-Forwarded-For`, `X-Real-IP` or the
/// connection info, in that order.
pub fn client_ip(request: &Request) -> Option<String> {
    let headers = request.headers();

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    forwarded.or(real_ip).map(str::to_owned).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

/// Marks a response as failed so the logger reports it at error level.
///
/// ```rust,ignore
/// (StatusCode::BAD_GATEWAY, RequestError::new("upstream timed out"), "try again later")
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError(pub String);

impl RequestError {
    /// Creates the marker with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl IntoResponseParts for RequestError {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    #[test]
    fn test_client_ip() -> anyhow::Result<()> {
        let request = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())?;
        assert_eq!(client_ip(&request).as_deref(), Some("203.0.113.7"));

        let request = axum::http::Request::builder()
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())?;
        assert_eq!(client_ip(&request).as_deref(), Some("198.51.100.2"));

        let mut request = Request::new(Body::empty());
        assert_eq!(client_ip(&request), None);

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(client_ip(&request).as_deref(), Some("127.0.0.1"));

        Ok(())
    }

    #[test]
    fn test_request_info() -> anyhow::Result<()> {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/users?page=2")
            .header(header::USER_AGENT, "curl/8.0")
            .body(Body::empty())?;

        let info = RequestInfo::new(&request);
        assert_eq!(info.method, Method::POST);
        assert_eq!(info.path, "/users");
        assert_eq!(info.query.as_deref(), Some("page=2"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.0"));

        Ok(())
    }
}
