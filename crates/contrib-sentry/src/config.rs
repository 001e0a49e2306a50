//! SDK initialization.

use std::fmt;

#[cfg(feature = "config")]
use clap::Args;
use sentry::types::Dsn;
use sentry::{ClientInitGuard, ClientOptions};
use serde::{Deserialize, Serialize};

use crate::{SentryError, SentryResult, TRACING_TARGET_SENTRY};

/// Sentry SDK configuration.
///
/// Without a DSN the SDK is initialized disabled and captures nothing.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[serde(default)]
pub struct SentryConfig {
    /// Project DSN.
    #[cfg_attr(feature = "config", arg(long = "sentry-dsn", env = "SENTRY_DSN"))]
    pub dsn: Option<String>,

    /// Environment name, e.g. `production`.
    #[cfg_attr(feature = "config", arg(long = "sentry-environment", env = "SENTRY_ENVIRONMENT"))]
    pub environment: Option<String>,

    /// Release identifier.
    #[cfg_attr(feature = "config", arg(long = "sentry-release", env = "SENTRY_RELEASE"))]
    pub release: Option<String>,

    /// Share of events that are sent, between 0 and 1.
    #[cfg_attr(
        feature = "config",
        arg(long = "sentry-sample-rate", env = "SENTRY_SAMPLE_RATE", default_value = "1.0")
    )]
    pub sample_rate: f32,

    /// Prints SDK diagnostics.
    #[cfg_attr(feature = "config", arg(long = "sentry-debug", env = "SENTRY_DEBUG"))]
    pub debug: bool,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            release: None,
            sample_rate: 1.0,
            debug: false,
        }
    }
}

impl SentryConfig {
    /// Creates a configuration for `dsn`.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: Some(dsn.into()),
            ..Default::default()
        }
    }

    /// Sets the environment name.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Sets the release identifier.
    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    /// Sets the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Builds the client options.
    pub fn client_options(&self) -> SentryResult<ClientOptions> {
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(SentryError::InvalidSampleRate(self.sample_rate));
        }

        let dsn = self
            .dsn
            .as_deref()
            .filter(|dsn| !dsn.is_empty())
            .map(str::parse::<Dsn>)
            .transpose()?;

        Ok(ClientOptions {
            dsn,
            environment: self.environment.clone().map(Into::into),
            release: self.release.clone().map(Into::into),
            sample_rate: self.sample_rate,
            debug: self.debug,
            ..Default::default()
        })
    }

    /// Initializes the global SDK client.
    ///
    /// Events are flushed when the returned guard is dropped.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_SENTRY)]
    pub fn init(&self) -> SentryResult<ClientInitGuard> {
        let options = self.client_options()?;
        let enabled = options.dsn.is_some();
        let guard = sentry::init(options);

        tracing::info!(
            target: TRACING_TARGET_SENTRY,
            enabled,
            environment = self.environment.as_deref(),
            "Sentry client initialized"
        );

        Ok(guard)
    }
}

impl fmt::Debug for SentryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentryConfig")
            .field("dsn", &self.dsn.as_ref().map(|_| "[REDACTED]"))
            .field("environment", &self.environment)
            .field("release", &self.release)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_options() -> anyhow::Result<()> {
        let options = SentryConfig::new("https://public@sentry.example.com/42")
            .with_environment("staging")
            .with_release("contrib@0.1.0")
            .with_sample_rate(0.5)
            .client_options()?;

        let dsn = options.dsn.as_ref().map(|dsn| dsn.project_id().to_string());
        assert_eq!(dsn.as_deref(), Some("42"));
        assert_eq!(options.environment.as_deref(), Some("staging"));
        assert_eq!(options.release.as_deref(), Some("contrib@0.1.0"));
        assert_eq!(options.sample_rate, 0.5);

        Ok(())
    }

    #[test]
    fn test_disabled_without_dsn() -> anyhow::Result<()> {
        let options = SentryConfig::default().client_options()?;
        assert!(options.dsn.is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_values() {
        assert!(SentryConfig::new("not a dsn").client_options().is_err());
        assert!(
            SentryConfig::default()
                .with_sample_rate(1.5)
                .client_options()
                .is_err()
        );
    }

    #[test]
    fn test_debug_redacts_dsn() {
        let config = SentryConfig::new("https://secret@sentry.example.com/1");
        assert!(!format!("{config:?}").contains("secret"));
    }
}
