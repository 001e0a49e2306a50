//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── server: ServerConfig      # Host, port, timeouts
//! └── adapters: AdapterConfig   # Per-middleware settings
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.

mod adapters;
mod server;

use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use self::adapters::AdapterConfig;
pub use self::server::ServerConfig;
use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_SERVER_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "contrib")]
#[command(about = "Demo server for the contrib middleware crates")]
#[command(version)]
pub struct Cli {
    /// Server network and lifecycle configuration.
    #[clap(flatten)]
    pub server: ServerConfig,

    /// Middleware configuration.
    #[clap(flatten)]
    pub adapters: AdapterConfig,

    /// Emits logs as JSON lines.
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is read first so clap's `env` fallbacks can see it.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(filter);

        if self.log_json {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.adapters
            .validate()
            .context("invalid middleware configuration")?;
        Ok(())
    }

    /// Logs configuration without secrets.
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_SERVER_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        self.server.log();

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            enabled = ?self.adapters.enabled_groups(),
            cors_origins = ?self.adapters.cors.allowed_origins,
            rate_limit_requests = self.adapters.throttler.requests,
            rate_limit_period_secs = self.adapters.throttler.period_seconds,
            "Middleware configuration"
        );
    }

    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_defaults() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["contrib"])?;
        assert_eq!(cli.server.port, 3000);
        assert!(cli.adapters.jwt_secret.is_none());
        assert!(cli.validate().is_ok());
        Ok(())
    }

    #[test]
    fn test_parse_adapter_flags() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "contrib",
            "--port",
            "8080",
            "--jwt-secret",
            "secret",
            "--cors-origins",
            "https://a.dev,https://b.dev",
            "--rate-limit-requests",
            "5",
        ])?;

        assert_eq!(cli.server.port, 8080);
        assert_eq!(cli.adapters.jwt_secret.as_deref(), Some("secret"));
        assert_eq!(cli.adapters.cors.allowed_origins.len(), 2);
        assert_eq!(cli.adapters.throttler.requests, 5);
        Ok(())
    }
}
