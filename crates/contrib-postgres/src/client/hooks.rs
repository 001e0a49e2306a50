//! Connection setup and pool lifecycle hooks.

use std::time::Instant;

use deadpool::managed::{HookResult, Metrics};
use diesel::ConnectionResult;
use diesel::connection::InstrumentationEvent;
use diesel_async::pooled_connection::{PoolError, PoolableConnection};
use diesel_async::{AsyncConnection, AsyncPgConnection};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::{TRACING_TARGET_CONNECTION, TRACING_TARGET_QUERY};

/// Establishes a plain connection.
pub fn setup_connection(addr: &str) -> BoxFuture<'_, ConnectionResult<AsyncPgConnection>> {
    establish(addr, false).boxed()
}

/// Establishes a connection that logs every query.
pub fn setup_traced_connection(addr: &str) -> BoxFuture<'_, ConnectionResult<AsyncPgConnection>> {
    establish(addr, true).boxed()
}

async fn establish(addr: &str, trace: bool) -> ConnectionResult<AsyncPgConnection> {
    let start = Instant::now();
    let result = AsyncPgConnection::establish(addr).await;
    let elapsed_ms = start.elapsed().as_millis();

    match result {
        Ok(mut conn) => {
            if trace {
                conn.set_instrumentation(trace_query);
            }

            tracing::info!(
                target: TRACING_TARGET_CONNECTION,
                elapsed_ms,
                trace,
                "Database connection established"
            );
            Ok(conn)
        }
        Err(err) => {
            tracing::error!(
                target: TRACING_TARGET_CONNECTION,
                elapsed_ms,
                error = %err,
                "Failed to establish database connection"
            );
            Err(err)
        }
    }
}

/// Logs queries reported by diesel's instrumentation.
fn trace_query(event: InstrumentationEvent<'_>) {
    match event {
        InstrumentationEvent::StartQuery { query, .. } => {
            tracing::debug!(target: TRACING_TARGET_QUERY, query = %query, "Executing query");
        }
        InstrumentationEvent::FinishQuery {
            query,
            error: Some(error),
            ..
        } => {
            tracing::warn!(
                target: TRACING_TARGET_QUERY,
                query = %query,
                error = %error,
                "Query failed"
            );
        }
        InstrumentationEvent::BeginTransaction { depth, .. } => {
            tracing::debug!(target: TRACING_TARGET_QUERY, depth = %depth, "Transaction started");
        }
        InstrumentationEvent::CommitTransaction { depth, .. } => {
            tracing::debug!(target: TRACING_TARGET_QUERY, depth = %depth, "Transaction committed");
        }
        InstrumentationEvent::RollbackTransaction { depth, .. } => {
            tracing::debug!(target: TRACING_TARGET_QUERY, depth = %depth, "Transaction rolled back");
        }
        _ => {}
    }
}

pub fn post_create(conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    tracing::debug!(
        target: TRACING_TARGET_CONNECTION,
        is_broken = conn.is_broken(),
        created_at = ?metrics.created,
        "Connection added to pool"
    );

    Ok(())
}

pub fn post_recycle(conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    if conn.is_broken() {
        tracing::error!(
            target: TRACING_TARGET_CONNECTION,
            recycle_count = metrics.recycle_count,
            "Connection is broken after recycling"
        );
    }

    Ok(())
}
