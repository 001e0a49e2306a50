//! Validation options.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use axum::response::Response;
#[cfg(feature = "config")]
use clap::Args;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{JwtError, JwtResult, TokenExtractor};

/// Picks the verification key for a token from its header.
pub type KeyGetter = Arc<dyn Fn(&Header) -> JwtResult<DecodingKey> + Send + Sync>;

/// Renders a validation failure.
pub type ErrorHandler = Arc<dyn Fn(&JwtError) -> Response + Send + Sync>;

/// Token validation options for claims of type `C`.
#[must_use = "config does nothing unless you use it"]
pub struct JwtConfig<C = serde_json::Value> {
    pub(crate) key_getter: KeyGetter,
    pub(crate) signing_method: Option<Algorithm>,
    pub(crate) credentials_optional: bool,
    pub(crate) enable_auth_on_options: bool,
    pub(crate) extractor: TokenExtractor,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) audience: Option<Vec<String>>,
    pub(crate) issuer: Option<Vec<String>>,
    pub(crate) leeway: u64,
    pub(crate) debug: bool,
    claims: PhantomData<fn() -> C>,
}

impl<C> JwtConfig<C> {
    /// Creates a config that resolves keys with `key_getter`.
    pub fn new<F>(key_getter: F) -> Self
    where
        F: Fn(&Header) -> JwtResult<DecodingKey> + Send + Sync + 'static,
    {
        Self {
            key_getter: Arc::new(key_getter),
            signing_method: None,
            credentials_optional: false,
            enable_auth_on_options: false,
            extractor: TokenExtractor::default(),
            error_handler: None,
            audience: None,
            issuer: None,
            leeway: 0,
            debug: false,
            claims: PhantomData,
        }
    }

    /// Creates a config that verifies HMAC signatures with `secret`.
    pub fn with_secret(secret: impl AsRef<[u8]>) -> Self {
        let key = DecodingKey::from_secret(secret.as_ref());
        Self::new(move |_| Ok(key.clone()))
    }

    /// Requires tokens to be signed with `algorithm`.
    pub fn with_signing_method(mut self, algorithm: Algorithm) -> Self {
        self.signing_method = Some(algorithm);
        self
    }

    /// Lets requests without a token through.
    pub fn with_credentials_optional(mut self, optional: bool) -> Self {
        self.credentials_optional = optional;
        self
    }

    /// Validates `OPTIONS` requests too.
    pub fn with_auth_on_options(mut self, enabled: bool) -> Self {
        self.enable_auth_on_options = enabled;
        self
    }

    /// Replaces the token extractor.
    pub fn with_extractor(mut self, extractor: TokenExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replaces the default `401 Unauthorized` response.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&JwtError) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Requires the `aud` claim to match one of `audience`.
    pub fn with_audience<I, T>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.audience = Some(audience.into_iter().map(Into::into).collect());
        self
    }

    /// Requires the `iss` claim to match one of `issuer`.
    pub fn with_issuer<I, T>(mut self, issuer: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.issuer = Some(issuer.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the clock skew allowed for `exp` and `nbf`, in seconds.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    /// Logs every validation step at debug level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Builds the `jsonwebtoken` validation for a token signed with `algorithm`.
    ///
    /// Only claims that are present are checked, so tokens without `exp`
    /// are accepted.
    pub(crate) fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims.clear();
        validation.leeway = self.leeway;
        validation.validate_nbf = true;

        match &self.audience {
            Some(audience) => validation.set_audience(audience),
            None => validation.validate_aud = false,
        }

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(issuer);
        }

        validation
    }
}

impl<C> Clone for JwtConfig<C> {
    fn clone(&self) -> Self {
        Self {
            key_getter: Arc::clone(&self.key_getter),
            signing_method: self.signing_method,
            credentials_optional: self.credentials_optional,
            enable_auth_on_options: self.enable_auth_on_options,
            extractor: self.extractor.clone(),
            error_handler: self.error_handler.clone(),
            audience: self.audience.clone(),
            issuer: self.issuer.clone(),
            leeway: self.leeway,
            debug: self.debug,
            claims: PhantomData,
        }
    }
}

impl<C> fmt::Debug for JwtConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("signing_method", &self.signing_method)
            .field("credentials_optional", &self.credentials_optional)
            .field("enable_auth_on_options", &self.enable_auth_on_options)
            .field("extractor", &self.extractor)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("leeway", &self.leeway)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Settings for HMAC-signed tokens, loadable from the command line.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct JwtSettings {
    /// Shared HMAC secret.
    #[cfg_attr(feature = "config", arg(long = "jwt-secret", env = "JWT_SECRET"))]
    pub secret: String,

    /// Required signing algorithm.
    #[cfg_attr(
        feature = "config",
        arg(long = "jwt-algorithm", env = "JWT_ALGORITHM", default_value = "HS256")
    )]
    pub algorithm: Algorithm,

    /// Lets requests without a token through.
    #[cfg_attr(
        feature = "config",
        arg(long = "jwt-credentials-optional", env = "JWT_CREDENTIALS_OPTIONAL")
    )]
    #[serde(default)]
    pub credentials_optional: bool,

    /// Accepted audiences.
    #[cfg_attr(
        feature = "config",
        arg(long = "jwt-audience", env = "JWT_AUDIENCE", value_delimiter = ',')
    )]
    #[serde(default)]
    pub audience: Vec<String>,

    /// Accepted issuers.
    #[cfg_attr(
        feature = "config",
        arg(long = "jwt-issuer", env = "JWT_ISSUER", value_delimiter = ',')
    )]
    #[serde(default)]
    pub issuer: Vec<String>,

    /// Clock skew allowed for time based claims, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "jwt-leeway", env = "JWT_LEEWAY", default_value = "0")
    )]
    #[serde(default)]
    pub leeway: u64,
}

impl JwtSettings {
    /// Creates HS256 settings for `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            credentials_optional: false,
            audience: Vec::new(),
            issuer: Vec::new(),
            leeway: 0,
        }
    }

    /// Builds the validation config.
    pub fn build<C>(&self) -> JwtConfig<C> {
        let mut config = JwtConfig::with_secret(self.secret.as_bytes())
            .with_signing_method(self.algorithm)
            .with_credentials_optional(self.credentials_optional)
            .with_leeway(self.leeway);

        if !self.audience.is_empty() {
            config = config.with_audience(self.audience.iter().cloned());
        }
        if !self.issuer.is_empty() {
            config = config.with_issuer(self.issuer.iter().cloned());
        }

        config
    }
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("credentials_optional", &self.credentials_optional)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("leeway", &self.leeway)
            .finish()
    }
}
