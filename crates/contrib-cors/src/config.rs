//! CORS (Cross-Origin Resource Sharing) middleware configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{CorsPolicy, CorsResult};

/// Methods allowed when none are configured.
const DEFAULT_METHODS: [&str; 3] = ["GET", "POST", "HEAD"];

/// Request headers allowed when none are configured.
const DEFAULT_HEADERS: [&str; 4] = ["Origin", "Accept", "Content-Type", "X-Requested-With"];

/// CORS configuration.
///
/// An empty list of allowed origins allows every origin, and reflects the
/// request origin when credentials are enabled. An explicit `*` cannot be
/// combined with credentials. Origins may contain a single `*` wildcard, e.g.
/// `https://*.example.com`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct CorsConfig {
    /// List of allowed CORS origins.
    #[cfg_attr(
        feature = "config",
        arg(long = "cors-origins", env = "CORS_ORIGINS", value_delimiter = ',')
    )]
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// List of allowed request methods.
    #[cfg_attr(
        feature = "config",
        arg(long = "cors-methods", env = "CORS_METHODS", value_delimiter = ',')
    )]
    #[serde(default)]
    pub allowed_methods: Vec<String>,

    /// List of allowed request headers, `*` allows any header.
    #[cfg_attr(
        feature = "config",
        arg(long = "cors-headers", env = "CORS_HEADERS", value_delimiter = ',')
    )]
    #[serde(default)]
    pub allowed_headers: Vec<String>,

    /// List of response headers exposed to the browser.
    #[cfg_attr(
        feature = "config",
        arg(long = "cors-exposed-headers", env = "CORS_EXPOSED_HEADERS", value_delimiter = ',')
    )]
    #[serde(default)]
    pub exposed_headers: Vec<String>,

    /// Maximum age for CORS preflight responses in seconds, zero disables the header.
    #[cfg_attr(
        feature = "config",
        arg(long = "cors-max-age", env = "CORS_MAX_AGE", default_value = "0")
    )]
    #[serde(default)]
    pub max_age_seconds: u64,

    /// Whether to allow credentials in CORS requests.
    #[cfg_attr(
        feature = "config",
        arg(long = "cors-allow-credentials", env = "CORS_ALLOW_CREDENTIALS")
    )]
    #[serde(default)]
    pub allow_credentials: bool,
}

impl CorsConfig {
    /// Sets the allowed origins.
    pub fn with_allowed_origins<I, T>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the allowed methods.
    pub fn with_allowed_methods<I, T>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the allowed request headers.
    pub fn with_allowed_headers<I, T>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the exposed response headers.
    pub fn with_exposed_headers<I, T>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.exposed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the preflight max age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_seconds = max_age.as_secs();
        self
    }

    /// Enables or disables credentials.
    pub fn with_credentials(mut self, allow_credentials: bool) -> Self {
        self.allow_credentials = allow_credentials;
        self
    }

    /// Returns the CORS max age as a Duration, if set.
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_seconds > 0).then(|| Duration::from_secs(self.max_age_seconds))
    }

    /// Returns the configured methods, or `GET, POST, HEAD` when empty.
    pub fn effective_methods(&self) -> Vec<&str> {
        if self.allowed_methods.is_empty() {
            DEFAULT_METHODS.to_vec()
        } else {
            self.allowed_methods.iter().map(String::as_str).collect()
        }
    }

    /// Returns the configured request headers, or the simple default set when empty.
    pub fn effective_headers(&self) -> Vec<&str> {
        if self.allowed_headers.is_empty() {
            DEFAULT_HEADERS.to_vec()
        } else {
            self.allowed_headers.iter().map(String::as_str).collect()
        }
    }

    /// Validates the configuration by compiling it into a [`CorsPolicy`].
    pub fn validate(&self) -> CorsResult<()> {
        CorsPolicy::new(self).map(|_| ())
    }

    /// Compiles the configuration into a [`CorsPolicy`].
    pub fn build(&self) -> CorsResult<CorsPolicy> {
        CorsPolicy::new(self)
    }
}
