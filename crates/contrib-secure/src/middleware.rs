//! Security middleware and router extension.

use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};

use crate::config::NONCE_PLACEHOLDER;
use crate::{CspNonce, SecureConfig, SecureError, SecureResult, TRACING_TARGET_SECURE};

const X_XSS_PROTECTION: HeaderName = HeaderName::from_static("x-xss-protection");
const PUBLIC_KEY_PINS: HeaderName = HeaderName::from_static("public-key-pins");

/// Response produced for requests whose host is not allowed.
pub type BadHostHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Compiled security middleware state.
///
/// Cheap to clone, all state is shared.
#[derive(Clone)]
pub struct Secure {
    config: Arc<SecureConfig>,
    proxy_headers: Arc<[(HeaderName, String)]>,
    bad_host_handler: Option<BadHostHandler>,
}

impl Secure {
    /// Validates `config` and creates the middleware state.
    pub fn new(config: SecureConfig) -> SecureResult<Self> {
        let proxy_headers = config
            .ssl_proxy_headers
            .iter()
            .map(|(name, value)| {
                HeaderName::from_bytes(name.as_bytes())
                    .map(|name| (name, value.clone()))
                    .map_err(|_| SecureError::InvalidHeaderName(name.clone()))
            })
            .collect::<SecureResult<Vec<_>>>()?;

        let values = [
            ("Content-Security-Policy", &config.content_security_policy),
            (
                "Content-Security-Policy-Report-Only",
                &config.content_security_policy_report_only,
            ),
            ("X-Frame-Options", &config.custom_frame_options_value),
            ("Public-Key-Pins", &config.public_key),
            ("Host", &config.ssl_host),
        ];

        for (name, value) in values {
            if let Some(value) = value
                && HeaderValue::from_str(value).is_err()
            {
                return Err(SecureError::InvalidHeaderValue {
                    name,
                    value: value.clone(),
                });
            }
        }

        Ok(Self {
            config: Arc::new(config),
            proxy_headers: proxy_headers.into(),
            bad_host_handler: None,
        })
    }

    /// Replaces the default `500 Bad Host` response.
    pub fn with_bad_host_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.bad_host_handler = Some(Arc::new(handler));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SecureConfig {
        &self.config
    }

    /// Returns whether the request arrived over HTTPS, directly or via a proxy.
    pub fn is_ssl(&self, request: &Request) -> bool {
        if request.uri().scheme_str() == Some("https") {
            return true;
        }

        self.proxy_headers.iter().any(|(name, expected)| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value == expected)
        })
    }

    /// Checks the host and the transport, and attaches a nonce when needed.
    ///
    /// Returns the response to send instead of calling the handler when the
    /// host is not allowed or the request must be redirected to HTTPS.
    pub fn process(&self, request: &mut Request) -> Result<(), Response> {
        let config = &self.config;
        let host = request_host(request).map(str::to_owned);

        if !config.is_development && !config.allowed_hosts.is_empty() {
            let allowed = host.as_deref().is_some_and(|host| {
                config
                    .allowed_hosts
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(host))
            });

            if !allowed {
                tracing::warn!(
                    target: TRACING_TARGET_SECURE,
                    host = host.as_deref().unwrap_or_default(),
                    "Rejected request for a host that is not allowed"
                );

                return Err(match &self.bad_host_handler {
                    Some(handler) => handler(request),
                    None => (StatusCode::INTERNAL_SERVER_ERROR, "Bad Host").into_response(),
                });
            }
        }

        if config.ssl_redirect && !config.is_development && !self.is_ssl(request) {
            let target = config.ssl_host.as_deref().or(host.as_deref()).unwrap_or_default();
            let path = request
                .uri()
                .path_and_query()
                .map(|path| path.as_str())
                .unwrap_or("/");
            let location = format!("https://{target}{path}");

            let status = if config.ssl_temporary_redirect {
                StatusCode::TEMPORARY_REDIRECT
            } else {
                StatusCode::MOVED_PERMANENTLY
            };

            tracing::debug!(
                target: TRACING_TARGET_SECURE,
                location = %location,
                status = status.as_u16(),
                "Redirecting to HTTPS"
            );

            return Err((status, [(header::LOCATION, location)]).into_response());
        }

        if config.needs_nonce() {
            request.extensions_mut().insert(CspNonce::generate());
        }

        Ok(())
    }

    /// Writes the configured security headers.
    ///
    /// Headers the handler already set are left untouched.
    pub fn apply_headers(&self, headers: &mut HeaderMap, is_ssl: bool, nonce: Option<&CspNonce>) {
        let config = &self.config;
        let transport_headers = is_ssl && !config.is_development;

        if config.sts_seconds > 0
            && (is_ssl || config.force_sts_header)
            && !config.is_development
        {
            set_header(headers, header::STRICT_TRANSPORT_SECURITY, &config.sts_header_value());
        }

        if let Some(value) = config.frame_options_value() {
            set_header(headers, header::X_FRAME_OPTIONS, value);
        }

        if config.content_type_nosniff {
            set_header(headers, header::X_CONTENT_TYPE_OPTIONS, "nosniff");
        }

        if config.browser_xss_filter {
            set_header(headers, X_XSS_PROTECTION, "1; mode=block");
        }

        let policies = [
            (header::CONTENT_SECURITY_POLICY, &config.content_security_policy),
            (
                header::CONTENT_SECURITY_POLICY_REPORT_ONLY,
                &config.content_security_policy_report_only,
            ),
        ];

        for (name, policy) in policies {
            let Some(policy) = policy else { continue };
            match nonce {
                Some(nonce) => {
                    let policy = policy.replace(NONCE_PLACEHOLDER, &nonce.source());
                    set_header(headers, name, &policy);
                }
                None => set_header(headers, name, policy),
            }
        }

        if let Some(policy) = config.referrer_policy {
            set_header(headers, header::REFERRER_POLICY, policy.as_str());
        }

        if let Some(public_key) = config.public_key.as_deref().filter(|_| transport_headers) {
            set_header(headers, PUBLIC_KEY_PINS, public_key);
        }
    }
}

impl fmt::Debug for Secure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secure")
            .field("config", &self.config)
            .field("custom_bad_host_handler", &self.bad_host_handler.is_some())
            .finish_non_exhaustive()
    }
}

fn request_host(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.entry(name).or_insert(value);
        }
        Err(_) => {
            tracing::warn!(
                target: TRACING_TARGET_SECURE,
                header = %name,
                "Skipping security header with an invalid value"
            );
        }
    }
}

/// Applies the security checks and headers to a request.
pub async fn secure_headers(
    State(secure): State<Secure>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Err(response) = secure.process(&mut request) {
        return response;
    }

    let is_ssl = secure.is_ssl(&request);
    let nonce = request.extensions().get::<CspNonce>().cloned();

    let mut response = next.run(request).await;
    secure.apply_headers(response.headers_mut(), is_ssl, nonce.as_ref());
    response
}

/// Extension trait for `axum::`[`Router`] to apply the security middleware.
pub trait RouterSecureExt<S>: Sized {
    /// Layers the security middleware built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured header value is invalid.
    fn with_secure_headers(self, config: SecureConfig) -> SecureResult<Self>;

    /// Layers an already built [`Secure`] middleware.
    fn with_secure(self, secure: Secure) -> Self;
}

impl<S> RouterSecureExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_secure_headers(self, config: SecureConfig) -> SecureResult<Self> {
        Ok(self.with_secure(Secure::new(config)?))
    }

    fn with_secure(self, secure: Secure) -> Self {
        tracing::debug!(
            target: TRACING_TARGET_SECURE,
            allowed_hosts = ?secure.config().allowed_hosts,
            ssl_redirect = secure.config().ssl_redirect,
            development = secure.config().is_development,
            "Applying security middleware"
        );

        self.layer(from_fn_with_state(secure, secure_headers))
    }
}
