//! Validation middleware and router extension.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, decode_header};
use serde::de::DeserializeOwned;

use crate::{JwtConfig, JwtError, JwtResult, TRACING_TARGET_JWT, Token};

/// Compiled token validation middleware.
#[derive(Debug)]
pub struct Jwt<C = serde_json::Value> {
    config: Arc<JwtConfig<C>>,
}

impl<C> Clone for Jwt<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
        }
    }
}

macro_rules! debug_step {
    ($config:expr, $($arg:tt)+) => {
        if $config.debug {
            tracing::debug!(target: TRACING_TARGET_JWT, $($arg)+);
        }
    };
}

impl<C> Jwt<C>
where
    C: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates the middleware state.
    pub fn new(config: JwtConfig<C>) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &JwtConfig<C> {
        &self.config
    }

    /// Extracts and validates the token, storing it in the request extensions.
    ///
    /// Returns `Ok` without a token when none is required.
    pub fn check(&self, request: &mut Request) -> JwtResult<()> {
        let config = &self.config;

        if !config.enable_auth_on_options && request.method() == Method::OPTIONS {
            return Ok(());
        }

        let raw = match config.extractor.extract(request) {
            Ok(raw) => raw,
            Err(error) => {
                debug_step!(config, error = %error, "Error extracting token");
                return Err(error);
            }
        };

        let Some(raw) = raw else {
            if config.credentials_optional {
                debug_step!(config, "No credentials found, continuing");
                return Ok(());
            }
            debug_step!(config, "No credentials found");
            return Err(JwtError::MissingToken);
        };

        debug_step!(config, token = %raw, "Token extracted");
        let token = self.verify(raw)?;
        debug_step!(config, header = ?token.header, "Token validated");

        request.extensions_mut().insert(token);
        Ok(())
    }

    /// Verifies an encoded token.
    pub fn verify(&self, raw: String) -> JwtResult<Token<C>> {
        let config = &self.config;

        let header = decode_header(&raw).inspect_err(|error| {
            debug_step!(config, error = %error, "Error parsing token header");
        })?;

        if let Some(expected) = config.signing_method
            && expected != header.alg
        {
            let error = JwtError::UnexpectedAlgorithm {
                expected,
                actual: header.alg,
            };
            debug_step!(config, error = %error, "Error validating token algorithm");
            return Err(error);
        }

        let key = (config.key_getter)(&header)?;
        let validation = config.validation(header.alg);
        let data = decode::<C>(&raw, &key, &validation).inspect_err(|error| {
            debug_step!(config, error = %error, "Error verifying token");
        })?;

        Ok(Token {
            raw,
            header: data.header,
            claims: data.claims,
        })
    }

    /// Renders a validation failure with the configured error handler.
    pub fn handle_error(&self, error: JwtError) -> Response {
        match &self.config.error_handler {
            Some(handler) => handler(&error),
            None => error.into_response(),
        }
    }
}

/// Validates the request's token before calling the handler.
pub async fn check_jwt<C>(State(jwt): State<Jwt<C>>, mut request: Request, next: Next) -> Response
where
    C: DeserializeOwned + Clone + Send + Sync + 'static,
{
    if let Err(error) = jwt.check(&mut request) {
        tracing::debug!(
            target: TRACING_TARGET_JWT,
            method = %request.method(),
            path = %request.uri().path(),
            error = %error,
            "Token rejected"
        );
        return jwt.handle_error(error);
    }

    next.run(request).await
}

/// Extension trait for `axum::`[`Router`] to require valid tokens.
pub trait RouterJwtExt<S> {
    /// Layers [`check_jwt`] with claims of type `C`.
    fn with_jwt<C>(self, config: JwtConfig<C>) -> Self
    where
        C: DeserializeOwned + Clone + Send + Sync + 'static;
}

impl<S> RouterJwtExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_jwt<C>(self, config: JwtConfig<C>) -> Self
    where
        C: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.layer(from_fn_with_state(Jwt::new(config), check_jwt::<C>))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode, header};
    use axum::routing::get;
    use axum_test::TestServer;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::TokenExtractor;

    const SECRET: &[u8] = b"My Secret";

    fn sign(header: &Header, claims: &impl Serialize, secret: &[u8]) -> anyhow::Result<String> {
        Ok(encode(header, claims, &EncodingKey::from_secret(secret))?)
    }

    fn bearer(token: &str) -> anyhow::Result<HeaderValue> {
        Ok(HeaderValue::from_str(&format!("Bearer {token}"))?)
    }

    async fn ping(token: Token) -> String {
        let foo = token.claims["foo"].as_str().unwrap_or("Claims Failed");
        format!("Iauthenticated{foo}")
    }

    fn server(config: JwtConfig) -> anyhow::Result<TestServer> {
        let router = Router::new()
            .route("/secured/ping", get(ping).options(|| async { "preflight" }))
            .with_jwt(config);
        Ok(TestServer::new(router)?)
    }

    fn config() -> JwtConfig {
        JwtConfig::with_secret(SECRET).with_signing_method(Algorithm::HS256)
    }

    #[tokio::test]
    async fn test_basic_jwt() -> anyhow::Result<()> {
        let server = server(config())?;

        let response = server.get("/secured/ping").await;
        response.assert_status_unauthorized();
        response.assert_text("Required authorization token not found");

        let token = sign(&Header::default(), &json!({ "foo": "bar" }), SECRET)?;
        let response = server
            .get("/secured/ping")
            .add_header(header::AUTHORIZATION, bearer(&token)?)
            .await;
        response.assert_status_ok();
        response.assert_text("Iauthenticatedbar");

        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_header() -> anyhow::Result<()> {
        let server = server(config())?;

        let response = server
            .get("/secured/ping")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Token abc"))
            .await;
        response.assert_status_unauthorized();
        response.assert_text("Authorization header format must be Bearer {token}");

        Ok(())
    }

    #[tokio::test]
    async fn test_unexpected_algorithm() -> anyhow::Result<()> {
        let server = server(config())?;

        let token = sign(&Header::new(Algorithm::HS384), &json!({ "foo": "bar" }), SECRET)?;
        let response = server
            .get("/secured/ping")
            .add_header(header::AUTHORIZATION, bearer(&token)?)
            .await;
        response.assert_status_unauthorized();
        response.assert_text("Expected HS256 signing method but token specified HS384");

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_signature() -> anyhow::Result<()> {
        let server = server(config())?;

        let token = sign(&Header::default(), &json!({ "foo": "bar" }), b"Other Secret")?;
        let response = server
            .get("/secured/ping")
            .add_header(header::AUTHORIZATION, bearer(&token)?)
            .await;
        response.assert_status_unauthorized();

        Ok(())
    }

    #[tokio::test]
    async fn test_expired_token() -> anyhow::Result<()> {
        let server = server(config())?;

        let expired = get_current_timestamp() - 3600;
        let token = sign(&Header::default(), &json!({ "foo": "bar", "exp": expired }), SECRET)?;
        let response = server
            .get("/secured/ping")
            .add_header(header::AUTHORIZATION, bearer(&token)?)
            .await;
        response.assert_status_unauthorized();

        Ok(())
    }

    #[tokio::test]
    async fn test_credentials_optional() -> anyhow::Result<()> {
        let router = Router::new()
            .route(
                "/",
                get(|token: Option<Token>| async move {
                    if token.is_some() { "user" } else { "anonymous" }
                }),
            )
            .with_jwt(config().with_credentials_optional(true));
        let server = TestServer::new(router)?;

        let response = server.get("/").await;
        response.assert_status_ok();
        response.assert_text("anonymous");

        let token = sign(&Header::default(), &json!({}), SECRET)?;
        let response = server
            .get("/")
            .add_header(header::AUTHORIZATION, bearer(&token)?)
            .await;
        response.assert_text("user");

        Ok(())
    }

    #[tokio::test]
    async fn test_options_skip_validation() -> anyhow::Result<()> {
        let response = server(config())?.method(Method::OPTIONS, "/secured/ping").await;
        response.assert_status_ok();
        response.assert_text("preflight");

        let response = server(config().with_auth_on_options(true))?
            .method(Method::OPTIONS, "/secured/ping")
            .await;
        response.assert_status_unauthorized();

        Ok(())
    }

    #[tokio::test]
    async fn test_parameter_extractor() -> anyhow::Result<()> {
        let server = server(config().with_extractor(TokenExtractor::parameter("token")))?;

        let token = sign(&Header::default(), &json!({ "foo": "query" }), SECRET)?;
        let response = server.get(&format!("/secured/ping?token={token}")).await;
        response.assert_status_ok();
        response.assert_text("Iauthenticatedquery");

        Ok(())
    }

    #[tokio::test]
    async fn test_custom_error_handler() -> anyhow::Result<()> {
        let config = config().with_error_handler(|error| {
            (StatusCode::FORBIDDEN, format!("denied: {error}")).into_response()
        });
        let response = server(config)?.get("/secured/ping").await;

        response.assert_status_forbidden();
        response.assert_text("denied: Required authorization token not found");

        Ok(())
    }

    #[tokio::test]
    async fn test_typed_claims_and_audience() -> anyhow::Result<()> {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Claims {
            sub: String,
            aud: String,
        }

        let config = JwtConfig::<Claims>::with_secret(SECRET).with_audience(["contrib"]);
        let router = Router::new()
            .route("/", get(|token: Token<Claims>| async move { token.claims.sub }))
            .with_jwt(config);
        let server = TestServer::new(router)?;

        let claims = Claims {
            sub: "alice".into(),
            aud: "contrib".into(),
        };
        let token = sign(&Header::default(), &claims, SECRET)?;
        let response = server
            .get("/")
            .add_header(header::AUTHORIZATION, bearer(&token)?)
            .await;
        response.assert_status_ok();
        response.assert_text("alice");

        let claims = Claims {
            aud: "someone-else".into(),
            ..claims
        };
        let token = sign(&Header::default(), &claims, SECRET)?;
        let response = server
            .get("/")
            .add_header(header::AUTHORIZATION, bearer(&token)?)
            .await;
        response.assert_status_unauthorized();

        Ok(())
    }
}
