//! Rate limit keys.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderName;

use crate::{ThrottlerError, ThrottlerResult};

/// Builds the limiter key for a request.
///
/// Requests with equal keys share one bucket.
pub trait VaryBy: Send + Sync + 'static {
    /// Returns the key for `request`.
    fn key(&self, request: &Request) -> ThrottlerResult<String>;
}

impl<F> VaryBy for F
where
    F: Fn(&Request) -> ThrottlerResult<String> + Send + Sync + 'static,
{
    fn key(&self, request: &Request) -> ThrottlerResult<String> {
        self(request)
    }
}

/// One bucket for every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Global;

impl VaryBy for Global {
    fn key(&self, _request: &Request) -> ThrottlerResult<String> {
        Ok(String::new())
    }
}

/// Client address from `X-Forwarded-For`, `X-Real-IP`, then the connection.
///
/// The connection address needs `into_make_service_with_connect_info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByRemoteIp;

impl VaryBy for ByRemoteIp {
    fn key(&self, request: &Request) -> ThrottlerResult<String> {
        let headers = request.headers();

        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return Ok(ip.to_owned());
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = real_ip {
            return Ok(ip.to_owned());
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .ok_or(ThrottlerError::MissingKey("remote address"))
    }
}

/// Value of a request header, empty when absent.
#[derive(Debug, Clone)]
pub struct ByHeader(pub HeaderName);

impl ByHeader {
    /// Keys by the header `name`.
    pub const fn from_static(name: &'static str) -> Self {
        Self(HeaderName::from_static(name))
    }
}

impl VaryBy for ByHeader {
    fn key(&self, request: &Request) -> ThrottlerResult<String> {
        Ok(request
            .headers()
            .get(&self.0)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default())
    }
}

/// Request path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByPath;

impl VaryBy for ByPath {
    fn key(&self, request: &Request) -> ThrottlerResult<String> {
        Ok(request.uri().path().to_owned())
    }
}

/// Several keys joined by newlines.
#[derive(Default)]
pub struct ByMany(Vec<Box<dyn VaryBy>>);

impl ByMany {
    /// Creates an empty combination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key.
    pub fn with(mut self, vary_by: impl VaryBy) -> Self {
        self.0.push(Box::new(vary_by));
        self
    }
}

impl VaryBy for ByMany {
    fn key(&self, request: &Request) -> ThrottlerResult<String> {
        let keys = self
            .0
            .iter()
            .map(|vary_by| vary_by.key(request))
            .collect::<ThrottlerResult<Vec<_>>>()?;
        Ok(keys.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).expect("valid request")
    }

    #[test]
    fn test_remote_ip() {
        let key = ByRemoteIp.key(&request("/", &[("x-forwarded-for", "10.0.0.1, 10.0.0.2")]));
        assert_eq!(key.ok().as_deref(), Some("10.0.0.1"));

        let key = ByRemoteIp.key(&request("/", &[("x-real-ip", "10.0.0.3")]));
        assert_eq!(key.ok().as_deref(), Some("10.0.0.3"));

        let mut with_conn = request("/", &[]);
        with_conn
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 8080))));
        assert_eq!(ByRemoteIp.key(&with_conn).ok().as_deref(), Some("127.0.0.1"));

        assert!(ByRemoteIp.key(&request("/", &[])).is_err());
    }

    #[test]
    fn test_header_and_path() {
        let request = request("/a/b?c=d", &[("x-api-key", "k1")]);

        let key = ByHeader::from_static("x-api-key").key(&request);
        assert_eq!(key.ok().as_deref(), Some("k1"));

        let key = ByHeader::from_static("x-missing").key(&request);
        assert_eq!(key.ok().as_deref(), Some(""));

        assert_eq!(ByPath.key(&request).ok().as_deref(), Some("/a/b"));
    }

    #[test]
    fn test_many() {
        let request = request("/a", &[("x-api-key", "k1")]);
        let vary_by = ByMany::new()
            .with(ByHeader::from_static("x-api-key"))
            .with(ByPath);

        assert_eq!(vary_by.key(&request).ok().as_deref(), Some("k1\n/a"));
    }
}
