//! Schema creation and checks through embedded or file-based migrations.

use std::time::Instant;

use diesel::migration::MigrationSource;
use diesel::pg::Pg;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_migrations::MigrationHarness;
use tokio::task::spawn_blocking;

use crate::{PgClient, PgError, PgResult, TRACING_TARGET_MIGRATION};

impl PgClient {
    /// Applies every pending migration from `source` and returns the applied
    /// versions.
    #[tracing::instrument(skip_all, target = TRACING_TARGET_MIGRATION)]
    pub async fn run_pending_migrations<M>(&self, source: M) -> PgResult<Vec<String>>
    where
        M: MigrationSource<Pg> + Send + 'static,
    {
        let start = Instant::now();
        let conn = self.get_connection().await?;
        let mut conn: AsyncConnectionWrapper<_> = conn.into();

        let versions = spawn_blocking(move || {
            conn.run_pending_migrations(source)
                .map(|versions| versions.into_iter().map(|v| v.to_string()).collect::<Vec<_>>())
        })
        .await
        .map_err(|err| PgError::Migration(err.into()))?
        .map_err(|err| {
            tracing::error!(
                target: TRACING_TARGET_MIGRATION,
                error = %err,
                "Database migration failed"
            );
            PgError::Migration(err)
        })?;

        tracing::info!(
            target: TRACING_TARGET_MIGRATION,
            duration = ?start.elapsed(),
            migrations_count = versions.len(),
            "Database schema is up to date"
        );

        Ok(versions)
    }

    /// Returns the names of migrations from `source` that are not applied.
    #[tracing::instrument(skip_all, target = TRACING_TARGET_MIGRATION)]
    pub async fn pending_migrations<M>(&self, source: M) -> PgResult<Vec<String>>
    where
        M: MigrationSource<Pg> + Send + 'static,
    {
        let conn = self.get_connection().await?;
        let mut conn: AsyncConnectionWrapper<_> = conn.into();

        let pending = spawn_blocking(move || {
            conn.pending_migrations(source).map(|migrations| {
                migrations
                    .iter()
                    .map(|migration| migration.name().to_string())
                    .collect::<Vec<_>>()
            })
        })
        .await
        .map_err(|err| PgError::Migration(err.into()))?
        .map_err(PgError::Migration)?;

        if !pending.is_empty() {
            tracing::warn!(
                target: TRACING_TARGET_MIGRATION,
                pending = ?pending,
                "Database schema has pending migrations"
            );
        }

        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use diesel_migrations::FileBasedMigrations;

    use super::*;

    fn assert_source<M>()
    where
        M: MigrationSource<Pg> + Send + 'static,
    {
    }

    #[test]
    fn test_file_based_source() {
        assert_source::<FileBasedMigrations>();
    }
}
