//! HTTP server startup.

use std::future::IntoFuture;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::lifecycle::{Stop, drain_within};
use super::shutdown::{Resources, shutdown_signal};
use super::{ServerError, ServerResult};
use crate::config::ServerConfig;
use crate::{TRACING_TARGET_SERVER_SHUTDOWN, TRACING_TARGET_SERVER_STARTUP};

/// Binds the configured address and serves `app` until a shutdown signal,
/// then releases `resources`.
///
/// Open connections get `shutdown_timeout` to finish after the signal.
///
/// # Errors
///
/// Returns an error if:
/// - Server configuration is invalid
/// - Cannot bind to the specified address/port
/// - Server encounters a fatal error during operation
pub async fn serve(app: Router, server_config: ServerConfig, resources: Resources) -> ServerResult<()> {
    server_config
        .validate()
        .map_err(|err| ServerError::invalid_config(&err))?;

    let server_addr = server_config.server_addr();
    let listener = TcpListener::bind(server_addr).await.map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_SERVER_STARTUP,
            addr = %server_addr,
            error = %err,
            "Failed to bind to address"
        );
        ServerError::bind_error(&server_addr.to_string(), err)
    })?;

    if server_config.binds_to_all_interfaces() {
        tracing::warn!(
            target: TRACING_TARGET_SERVER_STARTUP,
            "Server bound to all interfaces (0.0.0.0) - ensure firewall is configured"
        );
    }

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        addr = %server_addr,
        background = resources.len(),
        "Server is ready and listening for connections"
    );

    let (signal_tx, signal_rx) = oneshot::channel();
    let graceful = async move {
        let signal = shutdown_signal().await;
        let _ = signal_tx.send(signal);
    };

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful)
    .into_future();

    let shutdown_timeout = server_config.shutdown_timeout();
    let result = drain_within(server, signal_rx, shutdown_timeout).await;

    if !resources.is_empty() {
        resources.release(shutdown_timeout).await;
    }

    match result {
        Ok(Stop::Drained) => Ok(()),
        Ok(Stop::TimedOut) => {
            tracing::info!(
                target: TRACING_TARGET_SERVER_SHUTDOWN,
                "Shutdown completed with connections dropped"
            );
            Ok(())
        }
        Err(err) => Err(ServerError::Runtime(err)),
    }
}
