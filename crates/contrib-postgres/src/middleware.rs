//! Connection middleware and router extension.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;

use crate::{Db, PgClient, PgConfig, PgError, PgResult, Rollback, TRACING_TARGET_MIDDLEWARE};

/// Renders acquisition, commit and rollback failures.
pub type ErrorHandler = Arc<dyn Fn(&PgError) -> Response + Send + Sync>;

/// Middleware state: the pool plus the per-request behaviour.
#[derive(Clone)]
pub struct Postgres {
    client: PgClient,
    transactional: bool,
    error_handler: Option<ErrorHandler>,
}

impl Postgres {
    /// Creates the middleware over an existing client.
    ///
    /// Transactional mode follows the client's configuration.
    pub fn new(client: PgClient) -> Self {
        Self {
            transactional: client.config().transactional,
            client,
            error_handler: None,
        }
    }

    /// Validates `config` and creates the pool.
    pub fn from_config(config: PgConfig) -> PgResult<Self> {
        Ok(Self::new(config.build()?))
    }

    /// Runs every request inside a transaction.
    pub fn with_transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    /// Replaces the default `500 Internal Server Error` response.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PgError) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &PgClient {
        &self.client
    }

    fn handle_error(&self, error: &PgError) -> Response {
        match &self.error_handler {
            Some(handler) => handler(error),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

impl fmt::Debug for Postgres {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Postgres")
            .field("client", &self.client)
            .field("transactional", &self.transactional)
            .finish_non_exhaustive()
    }
}

/// Stores a [`Db`] handle in the request, inside a transaction when enabled.
///
/// A handle already present in the request is reused, and no nested
/// transaction is opened on a handle that is already in one.
pub async fn attach_connection(
    State(postgres): State<Postgres>,
    mut request: Request,
    next: Next,
) -> Response {
    let db = match request.extensions().get::<Db>().cloned() {
        Some(db) => db,
        None => match postgres.client.get_connection().await {
            Ok(conn) => Db::new(conn),
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_MIDDLEWARE,
                    error = %error,
                    path = %request.uri().path(),
                    "Failed to acquire database connection"
                );
                return postgres.handle_error(&error);
            }
        },
    };

    if !postgres.transactional || db.in_transaction() {
        request.extensions_mut().insert(db);
        return next.run(request).await;
    }

    if let Err(error) = db.begin().await {
        tracing::error!(target: TRACING_TARGET_MIDDLEWARE, error = %error, "Failed to begin transaction");
        return postgres.handle_error(&error);
    }

    request.extensions_mut().insert(db.clone());

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            if let Err(error) = db.rollback().await {
                tracing::error!(
                    target: TRACING_TARGET_MIDDLEWARE,
                    error = %error,
                    "Failed to roll back after panic"
                );
            }
            std::panic::resume_unwind(panic);
        }
    };

    let rollback = should_roll_back(&response);

    let outcome = if rollback {
        tracing::debug!(
            target: TRACING_TARGET_MIDDLEWARE,
            status = %response.status(),
            "Rolling back request transaction"
        );
        db.rollback().await
    } else {
        db.commit().await
    };

    match outcome {
        Ok(()) => response,
        Err(error) => {
            tracing::error!(
                target: TRACING_TARGET_MIDDLEWARE,
                error = %error,
                rollback,
                "Failed to finish request transaction"
            );
            postgres.handle_error(&error)
        }
    }
}

/// Returns whether the request transaction ends in a rollback.
///
/// Responses carrying the [`Rollback`] marker or a 5xx status roll back.
pub fn should_roll_back(response: &Response) -> bool {
    response.extensions().get::<Rollback>().is_some() || response.status().is_server_error()
}

/// Extension trait for `axum::`[`Router`] to attach database handles.
pub trait RouterPostgresExt<S> {
    /// Layers [`attach_connection`] over every route.
    fn with_postgres(self, postgres: Postgres) -> Self;
}

impl<S> RouterPostgresExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_postgres(self, postgres: Postgres) -> Self {
        self.layer(from_fn_with_state(postgres, attach_connection))
    }
}
