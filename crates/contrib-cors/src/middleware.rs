//! Origin guard and router extension.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};

use crate::{CorsConfig, CorsPolicy, CorsResult, TRACING_TARGET_CORS};

/// Stops requests whose origin, or whose preflight method or headers, the
/// policy does not allow.
///
/// Requests without an `Origin` header are passed through unchanged.
pub async fn reject_disallowed(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(origin) = request.headers().get(header::ORIGIN) else {
        return next.run(request).await;
    };

    if !policy.is_origin_allowed(origin) {
        tracing::debug!(
            target: TRACING_TARGET_CORS,
            origin = ?origin,
            method = %request.method(),
            "Origin not allowed"
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    let preflight_method = request
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_METHOD)
        .filter(|_| request.method() == Method::OPTIONS);

    if let Some(requested) = preflight_method {
        let allowed = Method::from_bytes(requested.as_bytes())
            .is_ok_and(|method| policy.is_method_allowed(&method));
        if !allowed {
            tracing::debug!(
                target: TRACING_TARGET_CORS,
                requested_method = ?requested,
                "Preflight method not allowed"
            );
            return StatusCode::FORBIDDEN.into_response();
        }

        let requested_headers = request
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let denied = requested_headers
            .split(',')
            .filter(|name| !name.trim().is_empty())
            .find(|name| !policy.is_header_allowed(name));

        if let Some(denied) = denied {
            tracing::debug!(
                target: TRACING_TARGET_CORS,
                requested_header = denied.trim(),
                "Preflight header not allowed"
            );
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    next.run(request).await
}

/// Extension trait for `axum::`[`Router`] to apply CORS handling.
pub trait RouterCorsExt<S>: Sized {
    /// Layers the origin guard in front of a [`CorsLayer`] built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be compiled.
    ///
    /// [`CorsLayer`]: tower_http::cors::CorsLayer
    fn with_cors(self, config: &CorsConfig) -> CorsResult<Self>;
}

impl<S> RouterCorsExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_cors(self, config: &CorsConfig) -> CorsResult<Self> {
        let policy = Arc::new(CorsPolicy::new(config)?);

        tracing::debug!(
            target: TRACING_TARGET_CORS,
            origins = ?config.allowed_origins,
            methods = ?config.effective_methods(),
            credentials = config.allow_credentials,
            "Applying CORS layer"
        );

        // Last added layer runs first: the guard rejects before headers are negotiated.
        Ok(self
            .layer(Arc::clone(&policy).into_layer())
            .layer(from_fn_with_state(policy, reject_disallowed)))
    }
}
