//! Database error type.

use std::borrow::Cow;

use deadpool::managed::TimeoutType;
use diesel::ConnectionError;
use diesel::result::Error;
use diesel_async::pooled_connection::PoolError as DieselPoolError;
use diesel_async::pooled_connection::deadpool::PoolError as DeadpoolError;

use crate::TRACING_TARGET_CONNECTION;

/// Type-erased error type returned by the migration harness.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while configuring the pool, acquiring connections, running
/// queries or migrating the schema.
#[derive(Debug, thiserror::Error)]
#[must_use = "database errors should be handled appropriately"]
pub enum PgError {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Waiting for, creating or recycling a connection timed out.
    #[error("Database operation timed out ({0:?})")]
    Timeout(TimeoutType),

    /// Failed to establish or keep a connection.
    #[error("Database connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Applying or checking migrations failed.
    #[error("Database migration error: {0}")]
    Migration(BoxError),

    /// Query or transaction failure.
    #[error("Database query error: {0}")]
    Query(#[from] Error),

    /// Pool state that should not occur.
    #[error("Unexpected error: {0}")]
    Unexpected(Cow<'static, str>),
}

impl PgError {
    /// Returns whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PgError::Timeout(_) | PgError::Connection(ConnectionError::BadConnection(_))
        )
    }

    /// Returns the violated constraint, if any.
    pub fn constraint(&self) -> Option<&str> {
        let PgError::Query(Error::DatabaseError(_, info)) = self else {
            return None;
        };

        info.constraint_name()
    }
}

/// Reports whether the error is diesel's "no rows returned".
pub fn is_not_found(error: &PgError) -> bool {
    matches!(error, PgError::Query(Error::NotFound))
}

impl From<DeadpoolError> for PgError {
    fn from(value: DeadpoolError) -> Self {
        match value {
            DeadpoolError::Timeout(timeout) => Self::Timeout(timeout),
            DeadpoolError::Backend(DieselPoolError::QueryError(error)) => Self::Query(error),
            DeadpoolError::Backend(DieselPoolError::ConnectionError(error)) => {
                Self::Connection(error)
            }
            DeadpoolError::PostCreateHook(err) => {
                tracing::warn!(target: TRACING_TARGET_CONNECTION, error = %err, "Post-create hook failed");
                Self::Unexpected(err.to_string().into())
            }
            DeadpoolError::NoRuntimeSpecified => Self::Unexpected("No runtime specified".into()),
            DeadpoolError::Closed => Self::Unexpected("Connection pool is closed".into()),
        }
    }
}

/// Specialized [`Result`] type for database operations.
pub type PgResult<T, E = PgError> = Result<T, E>;
