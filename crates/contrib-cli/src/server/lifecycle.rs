//! Bounded draining of in-flight connections.

use std::future::{Future, pending};
use std::io;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::shutdown::Signal;
use crate::TRACING_TARGET_SERVER_SHUTDOWN;

/// How the server future ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// Every connection finished.
    Drained,
    /// Connections were still open when the shutdown timeout passed.
    TimedOut,
}

/// Drives `server` until it stops, or until `timeout` has passed since a
/// shutdown signal arrived on `signalled`.
pub async fn drain_within<F>(
    server: F,
    signalled: oneshot::Receiver<Signal>,
    timeout: Duration,
) -> io::Result<Stop>
where
    F: Future<Output = io::Result<()>>,
{
    let started = Instant::now();
    let deadline = async {
        match signalled.await {
            Ok(_) => tokio::time::sleep(timeout).await,
            // The sender is dropped when the server stops without a signal.
            Err(_) => pending::<()>().await,
        }
    };

    let stop = tokio::select! {
        result = server => match result {
            Ok(()) => Stop::Drained,
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_SERVER_SHUTDOWN,
                    error = %error,
                    kind = ?error.kind(),
                    uptime_secs = started.elapsed().as_secs(),
                    "Server failed"
                );
                return Err(error);
            }
        },
        () = deadline => Stop::TimedOut,
    };

    match stop {
        Stop::Drained => tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            uptime_secs = started.elapsed().as_secs(),
            "Connections drained"
        ),
        Stop::TimedOut => tracing::warn!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            timeout_secs = timeout.as_secs(),
            "Shutdown timeout reached, dropping open connections"
        ),
    }

    Ok(stop)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_server_stops_on_its_own() -> anyhow::Result<()> {
        let (_signal, signalled) = oneshot::channel();
        let stop = drain_within(async { Ok(()) }, signalled, TIMEOUT).await?;
        assert_eq!(stop, Stop::Drained);
        Ok(())
    }

    #[tokio::test]
    async fn test_open_connections_time_out() -> anyhow::Result<()> {
        let (signal, signalled) = oneshot::channel();
        let _ = signal.send(Signal::Terminate);

        let stop = drain_within(pending::<io::Result<()>>(), signalled, TIMEOUT).await?;
        assert_eq!(stop, Stop::TimedOut);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_timeout_without_signal() -> anyhow::Result<()> {
        let (signal, signalled) = oneshot::channel::<Signal>();
        drop(signal);

        let server = async {
            tokio::time::sleep(TIMEOUT * 2).await;
            Ok(())
        };
        let stop = drain_within(server, signalled, TIMEOUT).await?;
        assert_eq!(stop, Stop::Drained);
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error() {
        let (_signal, signalled) = oneshot::channel();
        let result = drain_within(async { Err(io::Error::other("boom")) }, signalled, TIMEOUT).await;
        assert!(result.is_err());
    }
}
