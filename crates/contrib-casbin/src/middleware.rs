//! Enforcement middleware and router extension.

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};

use crate::{Casbin, TRACING_TARGET_CASBIN};

/// Stops requests the policy denies with `403 Forbidden`.
pub async fn enforce(State(casbin): State<Casbin>, request: Request, next: Next) -> Response {
    if !casbin.check(&request).await {
        tracing::warn!(
            target: TRACING_TARGET_CASBIN,
            path = %request.uri().path(),
            method = %request.method(),
            "Request denied by policy"
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    next.run(request).await
}

/// Extension trait for `axum::`[`Router`] to apply casbin enforcement.
pub trait RouterCasbinExt<S> {
    /// Layers the [`enforce`] middleware.
    fn with_casbin(self, casbin: Casbin) -> Self;
}

impl<S> RouterCasbinExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_casbin(self, casbin: Casbin) -> Self {
        self.layer(from_fn_with_state(casbin, enforce))
    }
}
