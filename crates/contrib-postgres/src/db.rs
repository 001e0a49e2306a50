//! Request-scoped database handle.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponseParts, ResponseParts};
use diesel_async::{AnsiTransactionManager, TransactionManager};
use tokio::sync::{Mutex, MutexGuard};

use crate::{PgResult, PooledConnection};

/// Shared handle to the connection checked out for the current request.
///
/// Clones refer to the same connection. The connection returns to the pool
/// once the last clone is dropped.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

struct DbInner {
    conn: Mutex<PooledConnection>,
    in_transaction: AtomicBool,
}

impl Db {
    /// Wraps a pooled connection.
    pub fn new(conn: PooledConnection) -> Self {
        Self {
            inner: Arc::new(DbInner {
                conn: Mutex::new(conn),
                in_transaction: AtomicBool::new(false),
            }),
        }
    }

    /// Locks the connection for exclusive use.
    pub async fn lock(&self) -> MutexGuard<'_, PooledConnection> {
        self.inner.conn.lock().await
    }

    /// Returns whether the middleware opened a transaction on this handle.
    pub fn in_transaction(&self) -> bool {
        self.inner.in_transaction.load(Ordering::Acquire)
    }

    pub(crate) async fn begin(&self) -> PgResult<()> {
        let mut conn = self.lock().await;
        AnsiTransactionManager::begin_transaction(&mut **conn).await?;
        self.inner.in_transaction.store(true, Ordering::Release);
        Ok(())
    }

    pub(crate) async fn commit(&self) -> PgResult<()> {
        let mut conn = self.lock().await;
        self.inner.in_transaction.store(false, Ordering::Release);
        AnsiTransactionManager::commit_transaction(&mut **conn).await?;
        Ok(())
    }

    pub(crate) async fn rollback(&self) -> PgResult<()> {
        let mut conn = self.lock().await;
        self.inner.in_transaction.store(false, Ordering::Release);
        AnsiTransactionManager::rollback_transaction(&mut **conn).await?;
        Ok(())
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

/// Returns the handle stored by the middleware.
pub fn db(request: &Request) -> Option<Db> {
    request.extensions().get::<Db>().cloned()
}

impl<S> FromRequestParts<S> for Db
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Db>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "database middleware is not installed",
        ))
    }
}

impl<S> OptionalFromRequestParts<S> for Db
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Db>().cloned())
    }
}

/// Response marker that rolls the request transaction back.
///
/// Return it alongside a response, e.g. `(StatusCode::CONFLICT, Rollback, body)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rollback;

impl IntoResponseParts for Rollback {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn test_rollback_marker() {
        let response = (StatusCode::CONFLICT, Rollback, "conflict").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.extensions().get::<Rollback>(), Some(&Rollback));
    }

    #[test]
    fn test_missing_handle() {
        let request = Request::new(axum::body::Body::empty());
        assert!(db(&request).is_none());
    }
}
