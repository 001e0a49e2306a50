//! Demo router with one route group per middleware.

use std::time::Duration;

use anyhow::Context;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use contrib_casbin::{Casbin, RouterCasbinExt, username};
use contrib_cors::RouterCorsExt;
use contrib_csrf::{Csrf, CsrfToken, RouterCsrfExt};
use contrib_jwt::{JwtSettings, RouterJwtExt, Token};
use contrib_logger::{Recovery, RequestLogger, RouterLoggerExt};
use contrib_postgres::{Db, Postgres, RouterPostgresExt};
use contrib_prometheus::{Prometheus, RouterPrometheusExt};
use contrib_recaptcha::{Recaptcha, RouterRecaptchaExt, VerifyResponse};
use contrib_secure::RouterSecureExt;
use contrib_sentry::{RouterSentryExt, SentryRecovery};
use contrib_throttler::RouterThrottlerExt;
use tower::{BoxError, ServiceBuilder};
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;

use crate::TRACING_TARGET_SERVER_STARTUP;
use crate::config::{AdapterConfig, Cli};
use crate::server::Resources;

/// How often idle rate limit buckets are dropped.
const THROTTLER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Builds the demo application.
///
/// Background tasks and pools started for the route groups are added to
/// `resources` so the server can release them on shutdown.
///
/// Layers are applied last-added-outermost:
/// 1. Timeout (outermost)
/// 2. Panic recovery and request logging
/// 3. Metrics
/// 4. Route groups, each with its own middleware
pub async fn create_router(cli: &Cli, resources: &mut Resources) -> anyhow::Result<Router> {
    let adapters = &cli.adapters;
    let mut app = Router::new()
        .route("/", get(index))
        .nest("/cors", cors_routes(adapters)?)
        .nest("/secure", secure_routes(adapters)?)
        .nest("/throttle", throttle_routes(adapters, resources)?)
        .nest("/panic", panic_routes(adapters));

    if let Some(secret) = &adapters.jwt_secret {
        app = app.nest("/jwt", jwt_routes(secret));
    }

    if let Some(key) = &adapters.csrf_key {
        app = app.nest("/csrf", csrf_routes(key, adapters)?);
    }

    if let Some((model, policy)) = adapters.casbin_files() {
        let casbin = Casbin::from_files(model, policy.to_string_lossy().into_owned())
            .await
            .context("failed to load casbin model or policy")?;
        app = app.nest("/casbin", casbin_routes(casbin));
    }

    if !adapters.recaptcha.secret.is_empty() {
        app = app.nest("/captcha", captcha_routes(adapters)?);
    }

    if adapters.postgres.url.is_some() {
        app = app.nest("/db", db_routes(adapters, resources)?);
    }

    tracing::debug!(
        target: TRACING_TARGET_SERVER_STARTUP,
        groups = ?adapters.enabled_groups(),
        "Route groups mounted"
    );

    let prometheus = Prometheus::new("contrib").context("failed to register metrics")?;
    let logger = RequestLogger::new(adapters.logger.clone()).context("invalid logger configuration")?;
    let timeout = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_timeout))
        .layer(TimeoutLayer::new(cli.server.request_timeout()));

    Ok(app
        .with_prometheus(prometheus.clone())
        .with_metrics_endpoint("/metrics", prometheus)
        .with_request_logger(logger)
        .with_recovery(Recovery::new(adapters.recovery_stack))
        .layer(timeout))
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "name": "contrib", "version": env!("CARGO_PKG_VERSION") }))
}

async fn handle_timeout(error: BoxError) -> (StatusCode, String) {
    if error.is::<Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_owned())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }
}

fn cors_routes(adapters: &AdapterConfig) -> anyhow::Result<Router> {
    let router = Router::new()
        .route("/", get(|| async { "GET: /cors" }).post(|| async { "POST: /cors" }))
        .with_cors(&adapters.cors)?;
    Ok(router)
}

fn secure_routes(adapters: &AdapterConfig) -> anyhow::Result<Router> {
    let router = Router::new()
        .route("/", get(|| async { "secure" }))
        .with_secure_headers(adapters.secure.clone())?;
    Ok(router)
}

fn throttle_routes(adapters: &AdapterConfig, resources: &mut Resources) -> anyhow::Result<Router> {
    let throttler = adapters.throttler.build()?;
    resources.track_task(
        "throttler_cleanup",
        throttler.spawn_cleanup(THROTTLER_CLEANUP_INTERVAL),
    );

    Ok(Router::new()
        .route("/", get(|| async { "not throttled" }))
        .with_throttler(throttler))
}

async fn explode() -> &'static str {
    panic!("panic requested by /panic")
}

fn panic_routes(adapters: &AdapterConfig) -> Router {
    let router = Router::new().route("/", get(explode));

    // Without a DSN the logger's recovery handles the panic instead.
    if adapters.sentry.dsn.is_some() {
        router.with_sentry(SentryRecovery::new())
    } else {
        router
    }
}

async fn jwt_ping(token: Token) -> Json<serde_json::Value> {
    Json(token.claims)
}

fn jwt_routes(secret: &str) -> Router {
    Router::new()
        .route("/ping", get(jwt_ping))
        .with_jwt(JwtSettings::new(secret).build::<serde_json::Value>())
}

async fn csrf_form(token: CsrfToken) -> String {
    token.to_string()
}

fn csrf_routes(key: &str, adapters: &AdapterConfig) -> anyhow::Result<Router> {
    let csrf = Csrf::new(key, adapters.csrf.clone())?;
    Ok(Router::new()
        .route("/", get(csrf_form).post(|| async { "submitted" }))
        .with_csrf(csrf))
}

fn casbin_routes(casbin: Casbin) -> Router {
    let whoami = |request: axum::extract::Request| async move { username(&request) };

    Router::new()
        .route("/{*resource}", get(whoami).post(whoami))
        .with_casbin(casbin)
}

async fn captcha_submit(axum::Extension(verified): axum::Extension<VerifyResponse>) -> String {
    verified.hostname.unwrap_or_default()
}

fn captcha_routes(adapters: &AdapterConfig) -> anyhow::Result<Router> {
    let recaptcha = Recaptcha::from_config(adapters.recaptcha.clone())?;
    Ok(Router::new()
        .route("/", post(captcha_submit))
        .with_recaptcha(recaptcha))
}

async fn db_status(db: Db) -> String {
    format!("in_transaction={}", db.in_transaction())
}

fn db_routes(adapters: &AdapterConfig, resources: &mut Resources) -> anyhow::Result<Router> {
    let postgres = Postgres::from_config(adapters.postgres.clone())?;
    resources.track_pool(postgres.client().clone());
    Ok(Router::new()
        .route("/", get(db_status))
        .with_postgres(postgres))
}
