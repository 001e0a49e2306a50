//! Cookie and token options.

use std::time::Duration;

use axum_extra::extract::cookie::SameSite;
#[cfg(feature = "config")]
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Default cookie lifetime, 12 hours.
const DEFAULT_MAX_AGE: u64 = 12 * 60 * 60;

/// `SameSite` attribute of the token cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum CookieSameSite {
    /// Sent with same-site requests only.
    Strict,
    /// Also sent with top-level cross-site navigation.
    #[default]
    Lax,
    /// Sent with every request, requires `Secure`.
    None,
}

impl From<CookieSameSite> for SameSite {
    fn from(value: CookieSameSite) -> Self {
        match value {
            CookieSameSite::Strict => SameSite::Strict,
            CookieSameSite::Lax => SameSite::Lax,
            CookieSameSite::None => SameSite::None,
        }
    }
}

/// CSRF middleware configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[serde(default)]
pub struct CsrfConfig {
    /// Name of the token cookie.
    #[cfg_attr(
        feature = "config",
        arg(long = "csrf-cookie-name", env = "CSRF_COOKIE_NAME", default_value = "_csrf")
    )]
    pub cookie_name: String,

    /// Cookie domain, defaults to the request host.
    #[cfg_attr(feature = "config", arg(long = "csrf-domain", env = "CSRF_DOMAIN"))]
    pub domain: Option<String>,

    /// Cookie path.
    #[cfg_attr(
        feature = "config",
        arg(long = "csrf-path", env = "CSRF_PATH", default_value = "/")
    )]
    pub path: String,

    /// Cookie lifetime in seconds; older cookies are replaced.
    #[cfg_attr(
        feature = "config",
        arg(id = "csrf_max_age", long = "csrf-max-age", env = "CSRF_MAX_AGE", default_value = "43200")
    )]
    pub max_age_seconds: u64,

    /// Marks the cookie `Secure`.
    #[cfg_attr(
        feature = "config",
        arg(long = "csrf-secure", env = "CSRF_SECURE", default_value = "true", action = clap::ArgAction::Set)
    )]
    pub secure: bool,

    /// Marks the cookie `HttpOnly`.
    #[cfg_attr(
        feature = "config",
        arg(long = "csrf-http-only", env = "CSRF_HTTP_ONLY", default_value = "true", action = clap::ArgAction::Set)
    )]
    pub http_only: bool,

    /// `SameSite` attribute of the cookie.
    #[cfg_attr(
        feature = "config",
        arg(long = "csrf-same-site", env = "CSRF_SAME_SITE", value_enum, default_value = "lax")
    )]
    pub same_site: CookieSameSite,

    /// Request header carrying the token.
    #[cfg_attr(
        feature = "config",
        arg(long = "csrf-header", env = "CSRF_HEADER", default_value = "X-CSRF-Token")
    )]
    pub request_header: String,

    /// Form field carrying the token.
    #[cfg_attr(
        feature = "config",
        arg(long = "csrf-field", env = "CSRF_FIELD", default_value = "csrf.token")
    )]
    pub field_name: String,

    /// Hosts, besides the request's own, accepted in the `Referer` of HTTPS requests.
    #[cfg_attr(
        feature = "config",
        arg(long = "csrf-trusted-origins", env = "CSRF_TRUSTED_ORIGINS", value_delimiter = ',')
    )]
    pub trusted_origins: Vec<String>,

    /// Treats `X-Forwarded-Proto: https` as an HTTPS request.
    #[cfg_attr(
        feature = "config",
        arg(long = "csrf-trust-forwarded-proto", env = "CSRF_TRUST_FORWARDED_PROTO")
    )]
    pub trust_forwarded_proto: bool,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "_csrf".to_owned(),
            domain: None,
            path: "/".to_owned(),
            max_age_seconds: DEFAULT_MAX_AGE,
            secure: true,
            http_only: true,
            same_site: CookieSameSite::Lax,
            request_header: "X-CSRF-Token".to_owned(),
            field_name: "csrf.token".to_owned(),
            trusted_origins: Vec::new(),
            trust_forwarded_proto: false,
        }
    }
}

impl CsrfConfig {
    /// Sets the cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Sets the cookie domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the cookie path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the cookie lifetime.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_seconds = max_age.as_secs();
        self
    }

    /// Sets the `Secure` attribute.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the `HttpOnly` attribute.
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Sets the `SameSite` attribute.
    pub fn with_same_site(mut self, same_site: CookieSameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Sets the request header name.
    pub fn with_request_header(mut self, header: impl Into<String>) -> Self {
        self.request_header = header.into();
        self
    }

    /// Sets the form field name.
    pub fn with_field_name(mut self, field: impl Into<String>) -> Self {
        self.field_name = field.into();
        self
    }

    /// Sets the trusted `Referer` hosts.
    pub fn with_trusted_origins<I, T>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.trusted_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Trusts `X-Forwarded-Proto` when detecting HTTPS.
    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }
}
