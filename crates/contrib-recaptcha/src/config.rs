//! Verification settings.

use std::fmt;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::DEFAULT_VERIFY_URL;

/// Default timeout for calls to the verify endpoint.
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// reCAPTCHA verification configuration.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[serde(default)]
pub struct RecaptchaConfig {
    /// Site secret shared with Google.
    #[cfg_attr(
        feature = "config",
        arg(long = "recaptcha-secret", env = "RECAPTCHA_SECRET", default_value = "")
    )]
    pub secret: String,

    /// Verification endpoint.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "recaptcha-verify-url",
            env = "RECAPTCHA_VERIFY_URL",
            default_value = DEFAULT_VERIFY_URL
        )
    )]
    pub verify_url: String,

    /// Timeout for calls to the verify endpoint in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "recaptcha-timeout", env = "RECAPTCHA_TIMEOUT", default_value = "20")
    )]
    pub timeout_secs: u64,
}

impl RecaptchaConfig {
    /// Creates a configuration for the given site secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    /// Sets the verification endpoint.
    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RecaptchaConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            verify_url: DEFAULT_VERIFY_URL.to_owned(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for RecaptchaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecaptchaConfig")
            .field("secret", &"[REDACTED]")
            .field("verify_url", &self.verify_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecaptchaConfig::new("secret");
        assert_eq!(config.verify_url, DEFAULT_VERIFY_URL);
        assert_eq!(config.timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = RecaptchaConfig::new("very-secret");
        assert!(!format!("{config:?}").contains("very-secret"));
    }
}
