//! Per-middleware settings.

use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::Args;
use contrib_cors::CorsConfig;
use contrib_csrf::CsrfConfig;
use contrib_logger::LoggerConfig;
use contrib_postgres::PgConfig;
use contrib_recaptcha::RecaptchaConfig;
use contrib_secure::SecureConfig;
use contrib_sentry::SentryConfig;
use contrib_throttler::ThrottlerConfig;

/// Settings for every mounted middleware.
///
/// Groups whose secret or backing service is missing are left unmounted.
#[derive(Debug, Clone, Args)]
pub struct AdapterConfig {
    /// CORS settings for `/cors`.
    #[clap(flatten)]
    pub cors: CorsConfig,

    /// Security header settings for `/secure`.
    #[clap(flatten)]
    pub secure: SecureConfig,

    /// Rate limit settings for `/throttle`.
    #[clap(flatten)]
    pub throttler: ThrottlerConfig,

    /// Request logging settings for every route.
    #[clap(flatten)]
    pub logger: LoggerConfig,

    /// Sentry settings, events are dropped without a DSN.
    #[clap(flatten)]
    pub sentry: SentryConfig,

    /// CSRF cookie settings for `/csrf`.
    #[clap(flatten)]
    pub csrf: CsrfConfig,

    /// reCAPTCHA settings for `/captcha`.
    #[clap(flatten)]
    pub recaptcha: RecaptchaConfig,

    /// Postgres settings for `/db`.
    #[clap(flatten)]
    pub postgres: PgConfig,

    /// HMAC secret that enables `/jwt`.
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// HMAC key of at least 32 bytes that enables `/csrf`.
    #[arg(long, env = "CSRF_KEY")]
    pub csrf_key: Option<String>,

    /// Casbin model file, enables `/casbin` together with the policy.
    #[arg(long, env = "CASBIN_MODEL", requires = "casbin_policy")]
    pub casbin_model: Option<PathBuf>,

    /// Casbin CSV policy file.
    #[arg(long, env = "CASBIN_POLICY", requires = "casbin_model")]
    pub casbin_policy: Option<PathBuf>,

    /// Also reports panics with full stack traces in the recovery log.
    #[arg(long, env = "RECOVERY_STACK")]
    pub recovery_stack: bool,
}

impl AdapterConfig {
    /// Validates the settings the middleware crates do not check themselves.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.cors.validate().context("invalid CORS configuration")?;

        if let Some(key) = &self.csrf_key
            && key.len() < 32
        {
            return Err(anyhow!(
                "CSRF key must be at least 32 bytes, got {}",
                key.len()
            ));
        }

        if self.postgres.url.is_some() {
            self.postgres
                .validate()
                .context("invalid postgres configuration")?;
        }

        Ok(())
    }

    /// Returns the route groups that will be mounted.
    pub fn enabled_groups(&self) -> Vec<&'static str> {
        let optional = [
            self.jwt_secret.is_some().then_some("/jwt"),
            self.csrf_key.is_some().then_some("/csrf"),
            self.casbin_files().is_some().then_some("/casbin"),
            (!self.recaptcha.secret.is_empty()).then_some("/captcha"),
            self.postgres.url.is_some().then_some("/db"),
        ];

        ["/cors", "/secure", "/throttle", "/panic", "/metrics"]
            .into_iter()
            .chain(optional.into_iter().flatten())
            .collect()
    }

    /// Returns the casbin model and policy paths when both are set.
    pub fn casbin_files(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.casbin_model.as_ref().zip(self.casbin_policy.as_ref())
    }
}
