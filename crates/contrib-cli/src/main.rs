#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod routes;
mod server;

use std::process;

use anyhow::Context;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "contrib_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "contrib_cli::server::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "contrib_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %error,
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    cli.init_tracing();
    cli.validate()?;
    cli.log();

    // Kept alive until the server stops so queued events are flushed.
    let _sentry = cli
        .adapters
        .sentry
        .init()
        .context("failed to initialize sentry")?;

    let mut resources = server::Resources::default();
    let router = routes::create_router(&cli, &mut resources)
        .await
        .context("failed to build router")?;

    server::serve(router, cli.server, resources).await.inspect_err(|err| {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            recoverable = err.is_recoverable(),
            suggestion = err.suggestion(),
            "Server stopped with an error"
        );
    })?;

    Ok(())
}
