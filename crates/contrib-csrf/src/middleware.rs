//! Token issuing and validation middleware.

use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use url::Url;

use crate::store::{CookieStore, Token};
use crate::token::{CsrfField, FailureReason, SkipCheck, mask, tokens_match, unmask};
use crate::{CsrfConfig, CsrfError, CsrfResult, TRACING_TARGET_CSRF, failure_reason};

/// Largest urlencoded body buffered while looking for the form field.
const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// Renders a validation failure; read the reason with [`failure_reason`].
pub type ErrorHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Compiled CSRF middleware state.
#[derive(Clone)]
pub struct Csrf {
    config: Arc<CsrfConfig>,
    store: CookieStore,
    error_handler: Option<ErrorHandler>,
}

impl Csrf {
    /// Creates the middleware with an HMAC key of at least 32 bytes.
    pub fn new(auth_key: impl AsRef<[u8]>, config: CsrfConfig) -> CsrfResult<Self> {
        let store = CookieStore::new(
            auth_key.as_ref(),
            config.cookie_name.clone(),
            config.max_age_seconds,
        )?;

        Ok(Self {
            config: Arc::new(config),
            store,
            error_handler: None,
        })
    }

    /// Replaces the default `403 Forbidden` response.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    fn cookie(&self, value: String) -> Cookie<'static> {
        let config = &self.config;
        let mut cookie = Cookie::build((config.cookie_name.clone(), value))
            .path(config.path.clone())
            .http_only(config.http_only)
            .secure(config.secure)
            .same_site(config.same_site.into());

        if config.max_age_seconds > 0 {
            let seconds = i64::try_from(config.max_age_seconds).unwrap_or(i64::MAX);
            cookie = cookie.max_age(time::Duration::seconds(seconds));
        }
        if let Some(domain) = &config.domain {
            cookie = cookie.domain(domain.clone());
        }

        cookie.build()
    }

    fn is_https(&self, request: &Request) -> bool {
        if request.uri().scheme_str() == Some("https") {
            return true;
        }

        self.config.trust_forwarded_proto
            && request
                .headers()
                .get("x-forwarded-proto")
                .and_then(|value| value.to_str().ok())
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    }

    fn check_referer(&self, request: &Request) -> CsrfResult<()> {
        let referer = request
            .headers()
            .get(header::REFERER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Url::parse(value).ok())
            .ok_or(CsrfError::NoReferer)?;

        let Some(referer_host) = host_with_port(&referer) else {
            return Err(CsrfError::BadReferer);
        };

        let request_host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| request.uri().authority().map(|authority| authority.as_str()));

        let same_origin = referer.scheme() == "https"
            && request_host.is_some_and(|host| host.eq_ignore_ascii_case(&referer_host));
        let trusted = self
            .config
            .trusted_origins
            .iter()
            .any(|origin| origin.eq_ignore_ascii_case(&referer_host));

        if same_origin || trusted {
            Ok(())
        } else {
            Err(CsrfError::BadReferer)
        }
    }

    /// Finds the submitted token in the header or the urlencoded body.
    async fn submitted_token(&self, request: Request) -> (Request, Option<String>) {
        let from_header = request
            .headers()
            .get(self.config.request_header.as_str())
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_owned);

        if from_header.is_some() {
            return (request, from_header);
        }

        let is_form = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        if !is_form {
            return (request, None);
        }

        let (parts, body) = request.into_parts();
        let bytes = match to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::debug!(
                    target: TRACING_TARGET_CSRF,
                    error = %error,
                    "Failed to buffer form body"
                );
                return (Request::from_parts(parts, Body::empty()), None);
            }
        };

        let token = url::form_urlencoded::parse(&bytes)
            .find(|(key, _)| key == self.config.field_name.as_str())
            .map(|(_, value)| value.into_owned());

        (Request::from_parts(parts, Body::from(bytes)), token)
    }

    async fn validate(&self, request: Request, real: &Token) -> (Request, CsrfResult<()>) {
        if self.is_https(&request)
            && let Err(error) = self.check_referer(&request)
        {
            return (request, Err(error));
        }

        // A missing or undecodable submission never matches the real token.
        let (request, submitted) = self.submitted_token(request).await;
        let result = match submitted.as_deref().and_then(unmask) {
            Some(submitted) if tokens_match(&submitted, real) => Ok(()),
            _ => Err(CsrfError::BadToken),
        };

        (request, result)
    }

    fn handle_error(&self, request: &Request) -> Response {
        match &self.error_handler {
            Some(handler) => handler(request),
            None => match failure_reason(request) {
                Some(reason) => reason.clone().into_response(),
                None => CsrfError::BadToken.into_response(),
            },
        }
    }
}

impl fmt::Debug for Csrf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Csrf")
            .field("config", &self.config)
            .field("custom_error_handler", &self.error_handler.is_some())
            .finish_non_exhaustive()
    }
}

fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Issues the token cookie and validates unsafe requests.
pub async fn protect(State(csrf): State<Csrf>, mut request: Request, next: Next) -> Response {
    if request.extensions().get::<SkipCheck>().is_some() {
        return next.run(request).await;
    }

    let mut jar = CookieJar::from_headers(request.headers());
    let stored = jar
        .get(&csrf.config.cookie_name)
        .and_then(|cookie| csrf.store.decode(cookie.value()));

    let token = match stored {
        Some(token) => token,
        None => {
            let token = rand::random::<Token>();
            jar = jar.add(csrf.cookie(csrf.store.encode(&token)));
            token
        }
    };

    request.extensions_mut().insert(mask(&token));
    request
        .extensions_mut()
        .insert(CsrfField(csrf.config.field_name.clone()));

    if !is_safe(request.method()) {
        let (mut checked, result) = csrf.validate(request, &token).await;

        if let Err(error) = result {
            tracing::warn!(
                target: TRACING_TARGET_CSRF,
                method = %checked.method(),
                path = %checked.uri().path(),
                reason = %error,
                "CSRF validation failed"
            );
            checked.extensions_mut().insert(FailureReason(error));
            return (jar, csrf.handle_error(&checked)).into_response();
        }

        request = checked;
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Cookie"));
    (jar, response).into_response()
}

/// Extension trait for `axum::`[`Router`] to apply CSRF protection.
pub trait RouterCsrfExt<S> {
    /// Layers the [`protect`] middleware.
    fn with_csrf(self, csrf: Csrf) -> Self;
}

impl<S> RouterCsrfExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_csrf(self, csrf: Csrf) -> Self {
        self.layer(from_fn_with_state(csrf, protect))
    }
}

#[cfg(test)]
mod tests {
    use axum::Form;
    use axum::http::{HeaderName, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum_test::{TestResponse, TestServer};
    use serde::Deserialize;

    use super::*;
    use crate::CsrfToken;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
    const HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

    #[derive(Deserialize)]
    struct Signup {
        name: String,
    }

    fn router(csrf: Csrf) -> Router {
        Router::new()
            .route(
                "/signup",
                get(|token: CsrfToken| async move { token.to_string() })
                    .post(|Form(form): Form<Signup>| async move { form.name }),
            )
            .route("/api", axum::routing::post(|| async { "ok" }))
            .with_csrf(csrf)
    }

    fn server() -> anyhow::Result<TestServer> {
        let csrf = Csrf::new(KEY, CsrfConfig::default().with_secure(false))?;
        Ok(TestServer::new(router(csrf))?)
    }

    fn cookie(response: &TestResponse) -> Cookie<'static> {
        response.cookie("_csrf")
    }

    #[tokio::test]
    async fn test_get_issues_cookie_and_token() -> anyhow::Result<()> {
        let server = server()?;

        let response = server.get("/signup").await;
        response.assert_status_ok();
        response.assert_header(header::VARY, "Cookie");

        let cookie = cookie(&response);
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(12)));
        assert!(!response.text().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_post_without_token() -> anyhow::Result<()> {
        let server = server()?;

        let response = server.post("/api").await;
        response.assert_status_forbidden();
        response.assert_text("CSRF token invalid");

        Ok(())
    }

    #[tokio::test]
    async fn test_post_with_stale_cookie() -> anyhow::Result<()> {
        let server = server()?;

        let issued = server.get("/signup").await;
        let token = issued.text();

        // The cookie is replaced by a fresh token, which the old one cannot match.
        let response = server
            .post("/api")
            .add_cookie(Cookie::new("_csrf", "tampered"))
            .add_header(HEADER, HeaderValue::from_str(&token)?)
            .await;
        response.assert_status_forbidden();
        response.assert_text("CSRF token invalid");
        assert_ne!(cookie(&response).value(), "tampered");

        Ok(())
    }

    #[tokio::test]
    async fn test_post_with_header_token() -> anyhow::Result<()> {
        let server = server()?;

        let issued = server.get("/signup").await;
        let token = issued.text();
        let cookie = cookie(&issued);

        let response = server
            .post("/api")
            .add_cookie(cookie)
            .add_header(HEADER, HeaderValue::from_str(&token)?)
            .await;
        response.assert_status_ok();
        response.assert_text("ok");

        Ok(())
    }

    #[tokio::test]
    async fn test_post_with_form_field() -> anyhow::Result<()> {
        let server = server()?;

        let issued = server.get("/signup").await;
        let token = issued.text();
        let cookie = cookie(&issued);

        let response = server
            .post("/signup")
            .add_cookie(cookie)
            .form(&[("name", "alice"), ("csrf.token", token.as_str())])
            .await;
        response.assert_status_ok();
        response.assert_text("alice");

        Ok(())
    }

    #[tokio::test]
    async fn test_post_with_bad_token() -> anyhow::Result<()> {
        let server = server()?;

        let issued = server.get("/signup").await;
        let cookie = cookie(&issued);
        let other = server.get("/signup").await.text();

        let foreign = mask(&rand::random::<Token>());

        let response = server
            .post("/api")
            .add_cookie(cookie.clone())
            .add_header(HEADER, HeaderValue::from_str(foreign.as_str())?)
            .await;
        response.assert_status_forbidden();
        response.assert_text("CSRF token invalid");

        let response = server
            .post("/api")
            .add_cookie(cookie)
            .add_header(HEADER, HeaderValue::from_str(&other)?)
            .await;
        response.assert_status_forbidden();

        Ok(())
    }

    #[tokio::test]
    async fn test_https_referer_checks() -> anyhow::Result<()> {
        let csrf = Csrf::new(
            KEY,
            CsrfConfig::default()
                .with_trust_forwarded_proto(true)
                .with_trusted_origins(["trusted.example.com"]),
        )?;
        let server = TestServer::new(router(csrf))?;

        let issued = server.get("/signup").await;
        let token = issued.text();
        let cookie = cookie(&issued);

        let post = |referer: Option<&'static str>| {
            let mut request = server
                .post("/api")
                .add_cookie(cookie.clone())
                .add_header(HEADER, HeaderValue::from_str(&token).expect("header"))
                .add_header(header::HOST, HeaderValue::from_static("example.com"))
                .add_header(
                    HeaderName::from_static("x-forwarded-proto"),
                    HeaderValue::from_static("https"),
                );
            if let Some(referer) = referer {
                request = request.add_header(header::REFERER, HeaderValue::from_static(referer));
            }
            request
        };

        let response = post(None).await;
        response.assert_status_forbidden();
        response.assert_text("referer not supplied");

        let response = post(Some("https://evil.example.org/form")).await;
        response.assert_status_forbidden();
        response.assert_text("referer invalid");

        post(Some("https://example.com/form")).await.assert_status_ok();
        post(Some("https://trusted.example.com/form"))
            .await
            .assert_status_ok();

        Ok(())
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_replaced() -> anyhow::Result<()> {
        let server = server()?;

        let response = server
            .get("/signup")
            .add_cookie(Cookie::new("_csrf", "tampered"))
            .await;
        response.assert_status_ok();
        assert_ne!(cookie(&response).value(), "tampered");

        Ok(())
    }

    #[tokio::test]
    async fn test_skip_check() -> anyhow::Result<()> {
        let csrf = Csrf::new(KEY, CsrfConfig::default())?;
        let router = router(csrf).layer(from_fn(|mut request: Request, next: Next| {
            skip_check_for_api(&mut request);
            next.run(request)
        }));
        let server = TestServer::new(router)?;

        server.post("/api").await.assert_status_ok();

        Ok(())
    }

    fn skip_check_for_api(request: &mut Request) {
        if request.uri().path() == "/api" {
            crate::skip_check(request);
        }
    }

    #[tokio::test]
    async fn test_custom_error_handler() -> anyhow::Result<()> {
        let csrf = Csrf::new(KEY, CsrfConfig::default())?.with_error_handler(|request| {
            let reason = failure_reason(request)
                .map(ToString::to_string)
                .unwrap_or_default();
            (StatusCode::BAD_REQUEST, format!("custom: {reason}")).into_response()
        });
        let server = TestServer::new(router(csrf))?;

        let response = server.post("/api").await;
        response.assert_status_bad_request();
        response.assert_text("custom: CSRF token invalid");

        Ok(())
    }
}
