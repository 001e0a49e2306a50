//! Verification middleware and router extension.

use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use reqwest::Client;

use crate::extractor::from_headers;
use crate::verify::site_verify;
use crate::{
    RESPONSE_KEY, RecaptchaConfig, RecaptchaError, RecaptchaResult, ResponseExtractor,
    TRACING_TARGET_RECAPTCHA, VerifyResponse,
};

/// Renders a failed captcha check.
pub type ErrorHandler = Arc<dyn Fn(&RecaptchaError) -> Response + Send + Sync>;

/// Captcha verifier shared by the middleware and handlers.
///
/// Cloning is cheap, clones share the HTTP client.
#[derive(Clone)]
pub struct Recaptcha {
    http: Client,
    config: Arc<RecaptchaConfig>,
    extractor: ResponseExtractor,
    error_handler: Option<ErrorHandler>,
}

impl Recaptcha {
    /// Creates a verifier for the given site secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(secret: impl Into<String>) -> RecaptchaResult<Self> {
        Self::from_config(RecaptchaConfig::new(secret))
    }

    /// Creates a verifier from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: RecaptchaConfig) -> RecaptchaResult<Self> {
        let http = Client::builder().timeout(config.timeout()).build()?;

        tracing::debug!(
            target: TRACING_TARGET_RECAPTCHA,
            verify_url = %config.verify_url,
            timeout_secs = config.timeout_secs,
            "Creating recaptcha verifier"
        );

        Ok(Self {
            http,
            config: Arc::new(config),
            extractor: ResponseExtractor::default(),
            error_handler: None,
        })
    }

    /// Replaces where the middleware reads the captcha response from.
    pub fn with_extractor(mut self, extractor: ResponseExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replaces the default `401 Unauthorized` failure response.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RecaptchaError) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RecaptchaConfig {
        &self.config
    }

    /// Verifies a captcha response token.
    pub async fn verify(&self, response: &str) -> RecaptchaResult<VerifyResponse> {
        if response.is_empty() {
            return Err(RecaptchaError::ResponseNotFound);
        }

        if self.config.secret.is_empty() {
            return Err(RecaptchaError::MissingSecret);
        }

        site_verify(&self.http, &self.config.verify_url, &self.config.secret, response).await
    }

    /// Verifies the `g-recaptcha-response` header.
    pub async fn site_verify(&self, headers: &HeaderMap) -> RecaptchaResult<VerifyResponse> {
        let response = from_headers(headers, RESPONSE_KEY).ok_or(RecaptchaError::ResponseNotFound)?;
        self.verify(&response).await
    }

    /// Extracts and verifies the captcha response of a request.
    ///
    /// The verified response is stored in the request extensions.
    pub async fn check(&self, request: Request) -> RecaptchaResult<Request> {
        let (mut request, response) = self.extractor.extract(request).await?;
        let response = response.ok_or(RecaptchaError::ResponseNotFound)?;

        let verified = self.verify(&response).await?;
        request.extensions_mut().insert(verified);
        Ok(request)
    }

    /// Renders a failure with the configured error handler.
    pub fn handle_error(&self, error: RecaptchaError) -> Response {
        match &self.error_handler {
            Some(handler) => handler(&error),
            None => error.into_response(),
        }
    }
}

impl fmt::Debug for Recaptcha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recaptcha")
            .field("config", &self.config)
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}

/// Lets the request through only when its captcha response verifies.
pub async fn verify_captcha(
    State(recaptcha): State<Recaptcha>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    match recaptcha.check(request).await {
        Ok(request) => next.run(request).await,
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET_RECAPTCHA,
                method = %method,
                path = %path,
                error = %error,
                "Captcha verification failed"
            );
            recaptcha.handle_error(error)
        }
    }
}

/// Extension trait for `axum::`[`Router`] to require a solved captcha.
pub trait RouterRecaptchaExt<S> {
    /// Layers [`verify_captcha`] on every route.
    fn with_recaptcha(self, recaptcha: Recaptcha) -> Self;
}

impl<S> RouterRecaptchaExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_recaptcha(self, recaptcha: Recaptcha) -> Self {
        self.layer(from_fn_with_state(recaptcha, verify_captcha))
    }
}

#[cfg(test)]
mod tests {
    use axum::Extension;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum::routing::post;
    use axum_test::TestServer;
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    const SECRET: &str = "s3cret";

    fn key() -> HeaderName {
        HeaderName::from_static(RESPONSE_KEY)
    }

    async fn hostname(Extension(verified): Extension<VerifyResponse>) -> String {
        verified.hostname.unwrap_or_default()
    }

    async fn mock_google(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/siteverify")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body_contains("secret=s3cret")
                    .body_contains("response=good");
                then.status(200).json_body(json!({
                    "success": true,
                    "challenge_ts": "2024-03-01T10:20:30Z",
                    "hostname": "contrib.dev",
                    "error-codes": []
                }));
            })
            .await;

        server
            .mock_async(|when, then| {
                when.method(POST).path("/siteverify").body_contains("response=bad");
                then.status(200).json_body(json!({
                    "success": false,
                    "error-codes": ["invalid-input-response"]
                }));
            })
            .await;
    }

    fn recaptcha(secret: &str, server: &MockServer) -> anyhow::Result<Recaptcha> {
        let config = RecaptchaConfig::new(secret).with_verify_url(server.url("/siteverify"));
        Ok(Recaptcha::from_config(config)?)
    }

    fn app(recaptcha: Recaptcha) -> anyhow::Result<TestServer> {
        let router = Router::new()
            .route("/comment", post(hostname))
            .with_recaptcha(recaptcha);
        Ok(TestServer::new(router)?)
    }

    #[tokio::test]
    async fn test_verified_request() -> anyhow::Result<()> {
        let google = MockServer::start_async().await;
        mock_google(&google).await;
        let server = app(recaptcha(SECRET, &google)?)?;

        let response = server
            .post("/comment")
            .add_header(key(), HeaderValue::from_static("good"))
            .await;

        response.assert_status_ok();
        response.assert_text("contrib.dev");
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_response() -> anyhow::Result<()> {
        let google = MockServer::start_async().await;
        mock_google(&google).await;
        let server = app(recaptcha(SECRET, &google)?)?;

        let response = server
            .post("/comment")
            .add_header(key(), HeaderValue::from_static("bad"))
            .await;

        response.assert_status_unauthorized();
        response.assert_text("google verification response failed");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_response() -> anyhow::Result<()> {
        let google = MockServer::start_async().await;
        let mock = google
            .mock_async(|when, then| {
                when.method(POST).path("/siteverify");
                then.status(200).json_body(json!({ "success": true }));
            })
            .await;
        let server = app(recaptcha(SECRET, &google)?)?;

        let response = server.post("/comment").await;

        response.assert_status_unauthorized();
        response.assert_text("captcha response not found");
        assert_eq!(mock.hits_async().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_secret() -> anyhow::Result<()> {
        let google = MockServer::start_async().await;
        mock_google(&google).await;
        let server = app(recaptcha("", &google)?)?;

        let response = server
            .post("/comment")
            .add_header(key(), HeaderValue::from_static("good"))
            .await;

        response.assert_status_unauthorized();
        response.assert_text("no secret is given");
        Ok(())
    }

    #[tokio::test]
    async fn test_undecodable_answer() -> anyhow::Result<()> {
        let google = MockServer::start_async().await;
        google
            .mock_async(|when, then| {
                when.method(POST).path("/siteverify");
                then.status(502).body("<html>bad gateway</html>");
            })
            .await;
        let server = app(recaptcha(SECRET, &google)?)?;

        let response = server
            .post("/comment")
            .add_header(key(), HeaderValue::from_static("good"))
            .await;

        response.assert_status_unauthorized();
        assert!(!response.text().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() -> anyhow::Result<()> {
        let config = RecaptchaConfig::new(SECRET).with_verify_url("http://127.0.0.1:1/siteverify");
        let server = app(Recaptcha::from_config(config)?)?;

        let response = server
            .post("/comment")
            .add_header(key(), HeaderValue::from_static("good"))
            .await;

        response.assert_status_unauthorized();
        Ok(())
    }

    #[tokio::test]
    async fn test_form_field_and_custom_handler() -> anyhow::Result<()> {
        let google = MockServer::start_async().await;
        mock_google(&google).await;

        let recaptcha = recaptcha(SECRET, &google)?
            .with_extractor(ResponseExtractor::form_field(RESPONSE_KEY))
            .with_error_handler(|error| (StatusCode::FORBIDDEN, format!("captcha: {error}")).into_response());

        let router = Router::new()
            .route("/comment", post(|body: String| async move { body }))
            .with_recaptcha(recaptcha);
        let server = TestServer::new(router)?;

        let response = server
            .post("/comment")
            .form(&[("text", "hello"), (RESPONSE_KEY, "good")])
            .await;
        response.assert_status_ok();
        response.assert_text("text=hello&g-recaptcha-response=good");

        let response = server
            .post("/comment")
            .form(&[("text", "hello"), (RESPONSE_KEY, "bad")])
            .await;
        response.assert_status_forbidden();
        response.assert_text("captcha: google verification response failed");

        Ok(())
    }

    #[tokio::test]
    async fn test_site_verify() -> anyhow::Result<()> {
        let google = MockServer::start_async().await;
        mock_google(&google).await;
        let recaptcha = recaptcha(SECRET, &google)?;

        let mut headers = HeaderMap::new();
        assert!(matches!(
            recaptcha.site_verify(&headers).await,
            Err(RecaptchaError::ResponseNotFound)
        ));

        headers.insert(key(), HeaderValue::from_static("good"));
        let verified = recaptcha.site_verify(&headers).await?;
        assert!(verified.success);
        assert_eq!(verified.hostname.as_deref(), Some("contrib.dev"));

        headers.insert(key(), HeaderValue::from_static("bad"));
        match recaptcha.site_verify(&headers).await {
            Err(RecaptchaError::VerificationFailed { error_codes }) => {
                assert_eq!(error_codes, vec!["invalid-input-response"]);
            }
            other => anyhow::bail!("unexpected result: {other:?}"),
        }

        Ok(())
    }
}
