#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

// Tracing target constants for consistent logging.

/// Tracing target for pool and connection lifecycle events.
pub const TRACING_TARGET_CONNECTION: &str = "contrib_postgres::connection";

/// Tracing target for traced queries.
pub const TRACING_TARGET_QUERY: &str = "contrib_postgres::queries";

/// Tracing target for schema migrations.
pub const TRACING_TARGET_MIGRATION: &str = "contrib_postgres::migrations";

/// Tracing target for the request middleware.
pub const TRACING_TARGET_MIDDLEWARE: &str = "contrib_postgres::middleware";

mod client;
mod config;
mod db;
mod error;
mod middleware;

pub use diesel_async::AsyncPgConnection as PgConnection;

pub use crate::client::{ConnectionPool, PgClient, PgPoolStatus, PooledConnection};
pub use crate::config::PgConfig;
pub use crate::db::{Db, Rollback, db};
pub use crate::error::{BoxError, PgError, PgResult, is_not_found};
pub use crate::middleware::{
    ErrorHandler, Postgres, RouterPostgresExt, attach_connection, should_roll_back,
};
