//! Security headers configuration.

use std::collections::HashMap;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

/// Placeholder replaced by a fresh nonce in content security policies.
pub const NONCE_PLACEHOLDER: &str = "$NONCE";

/// Security middleware configuration.
///
/// Every option is off by default, so `SecureConfig::default()` adds nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[serde(default)]
pub struct SecureConfig {
    /// Fully qualified host names that are allowed, empty allows any host.
    #[cfg_attr(
        feature = "config",
        arg(long = "secure-allowed-hosts", env = "SECURE_ALLOWED_HOSTS", value_delimiter = ',')
    )]
    pub allowed_hosts: Vec<String>,

    /// Redirects plain HTTP requests to HTTPS.
    #[cfg_attr(feature = "config", arg(long = "secure-ssl-redirect", env = "SECURE_SSL_REDIRECT"))]
    pub ssl_redirect: bool,

    /// Uses 307 instead of 301 for HTTPS redirects.
    #[cfg_attr(
        feature = "config",
        arg(long = "secure-ssl-temporary-redirect", env = "SECURE_SSL_TEMPORARY_REDIRECT")
    )]
    pub ssl_temporary_redirect: bool,

    /// Host name used for HTTPS redirects, defaults to the request host.
    #[cfg_attr(feature = "config", arg(long = "secure-ssl-host", env = "SECURE_SSL_HOST"))]
    pub ssl_host: Option<String>,

    /// Header and value pairs that mark a request as HTTPS behind a proxy.
    #[cfg_attr(feature = "config", arg(skip))]
    pub ssl_proxy_headers: HashMap<String, String>,

    /// `Strict-Transport-Security` max age, zero disables the header.
    #[cfg_attr(feature = "config", arg(long = "secure-sts-seconds", env = "SECURE_STS_SECONDS", default_value = "0"))]
    pub sts_seconds: u64,

    /// Appends `includeSubDomains` to the STS header.
    #[cfg_attr(
        feature = "config",
        arg(long = "secure-sts-include-subdomains", env = "SECURE_STS_INCLUDE_SUBDOMAINS")
    )]
    pub sts_include_subdomains: bool,

    /// Appends `preload` to the STS header.
    #[cfg_attr(feature = "config", arg(long = "secure-sts-preload", env = "SECURE_STS_PRELOAD"))]
    pub sts_preload: bool,

    /// Sends the STS header on plain HTTP requests too.
    #[cfg_attr(feature = "config", arg(long = "secure-force-sts", env = "SECURE_FORCE_STS"))]
    pub force_sts_header: bool,

    /// Sends `X-Frame-Options: DENY`.
    #[cfg_attr(feature = "config", arg(long = "secure-frame-deny", env = "SECURE_FRAME_DENY"))]
    pub frame_deny: bool,

    /// Custom `X-Frame-Options` value, takes precedence over `frame_deny`.
    #[cfg_attr(
        feature = "config",
        arg(long = "secure-frame-options", env = "SECURE_FRAME_OPTIONS")
    )]
    pub custom_frame_options_value: Option<String>,

    /// Sends `X-Content-Type-Options: nosniff`.
    #[cfg_attr(feature = "config", arg(long = "secure-nosniff", env = "SECURE_NOSNIFF"))]
    pub content_type_nosniff: bool,

    /// Sends `X-XSS-Protection: 1; mode=block`.
    #[cfg_attr(feature = "config", arg(long = "secure-xss-filter", env = "SECURE_XSS_FILTER"))]
    pub browser_xss_filter: bool,

    /// `Content-Security-Policy` value, may contain `$NONCE`.
    #[cfg_attr(feature = "config", arg(long = "secure-csp", env = "SECURE_CSP"))]
    pub content_security_policy: Option<String>,

    /// `Content-Security-Policy-Report-Only` value, may contain `$NONCE`.
    #[cfg_attr(
        feature = "config",
        arg(long = "secure-csp-report-only", env = "SECURE_CSP_REPORT_ONLY")
    )]
    pub content_security_policy_report_only: Option<String>,

    /// `Referrer-Policy` value.
    #[cfg_attr(
        feature = "config",
        arg(long = "secure-referrer-policy", env = "SECURE_REFERRER_POLICY")
    )]
    pub referrer_policy: Option<ReferrerPolicy>,

    /// `Public-Key-Pins` value, only sent over HTTPS.
    #[cfg_attr(feature = "config", arg(long = "secure-public-key", env = "SECURE_PUBLIC_KEY"))]
    pub public_key: Option<String>,

    /// Disables host checks, HTTPS redirects, STS and key pinning.
    #[cfg_attr(feature = "config", arg(long = "secure-development", env = "SECURE_DEVELOPMENT"))]
    pub is_development: bool,
}

impl SecureConfig {
    /// Sets the allowed hosts.
    pub fn with_allowed_hosts<I, T>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Enables HTTPS redirects, optionally to a fixed host.
    pub fn with_ssl_redirect(mut self, ssl_host: Option<String>) -> Self {
        self.ssl_redirect = true;
        self.ssl_host = ssl_host;
        self
    }

    /// Adds a header that marks proxied requests as HTTPS.
    pub fn with_ssl_proxy_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ssl_proxy_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the STS max age and flags.
    pub fn with_sts(mut self, seconds: u64, include_subdomains: bool, preload: bool) -> Self {
        self.sts_seconds = seconds;
        self.sts_include_subdomains = include_subdomains;
        self.sts_preload = preload;
        self
    }

    /// Sets the content security policy.
    pub fn with_content_security_policy(mut self, policy: impl Into<String>) -> Self {
        self.content_security_policy = Some(policy.into());
        self
    }

    /// Sets the report-only content security policy.
    pub fn with_content_security_policy_report_only(mut self, policy: impl Into<String>) -> Self {
        self.content_security_policy_report_only = Some(policy.into());
        self
    }

    /// Enables or disables development mode.
    pub fn with_development(mut self, is_development: bool) -> Self {
        self.is_development = is_development;
        self
    }

    /// Returns a strict preset for production deployments.
    pub fn strict() -> Self {
        Self {
            ssl_redirect: true,
            sts_seconds: 31_536_000,
            sts_include_subdomains: true,
            frame_deny: true,
            content_type_nosniff: true,
            browser_xss_filter: true,
            referrer_policy: Some(ReferrerPolicy::StrictOriginWhenCrossOrigin),
            ..Default::default()
        }
    }

    /// Returns the STS header value.
    pub fn sts_header_value(&self) -> String {
        let mut value = format!("max-age={}", self.sts_seconds);
        if self.sts_include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.sts_preload {
            value.push_str("; preload");
        }
        value
    }

    /// Returns the `X-Frame-Options` value, if any.
    pub fn frame_options_value(&self) -> Option<&str> {
        match &self.custom_frame_options_value {
            Some(value) if !value.is_empty() => Some(value),
            _ => self.frame_deny.then_some("DENY"),
        }
    }

    /// Returns whether any policy asks for a nonce.
    pub fn needs_nonce(&self) -> bool {
        [
            &self.content_security_policy,
            &self.content_security_policy_report_only,
        ]
        .into_iter()
        .flatten()
        .any(|policy| policy.contains(NONCE_PLACEHOLDER))
    }
}

/// Referrer-Policy header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ReferrerPolicy {
    /// No referrer information is sent.
    NoReferrer,
    /// Full URL unless downgrading from HTTPS to HTTP.
    NoReferrerWhenDowngrade,
    /// Sends only the origin (scheme, host, and port) as the referrer.
    Origin,
    /// Full URL for same-origin requests, origin otherwise.
    OriginWhenCrossOrigin,
    /// Full URL for same-origin requests, nothing otherwise.
    SameOrigin,
    /// Origin only, and nothing when downgrading.
    StrictOrigin,
    /// Full URL for same-origin, origin for cross-origin, nothing on downgrade.
    StrictOriginWhenCrossOrigin,
    /// Full URL for every request.
    UnsafeUrl,
}

impl ReferrerPolicy {
    /// Returns the header value.
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}
