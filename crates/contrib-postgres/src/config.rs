//! Connection and pool configuration.

use std::fmt;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{PgClient, PgError, PgResult, TRACING_TARGET_CONNECTION};

const MIN_CONNECTIONS: u32 = 1;
const MAX_CONNECTIONS: u32 = 64;

const MIN_CONN_TIMEOUT_SECS: u64 = 1;
const MAX_CONN_TIMEOUT_SECS: u64 = 300;

const MIN_IDLE_TIMEOUT_SECS: u64 = 30;
const MAX_IDLE_TIMEOUT_SECS: u64 = 3600;

/// Database configuration.
///
/// The connection is described either by `url` or by its parts (`host`,
/// `port`, `user`, `password`, `dbname`, `schema`, `sslmode`); a non-empty
/// URL wins.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[serde(default)]
pub struct PgConfig {
    /// PostgreSQL connection URL.
    #[cfg_attr(feature = "config", arg(long = "postgres-url", env = "POSTGRES_URL"))]
    pub url: Option<String>,

    /// Server host.
    #[cfg_attr(
        feature = "config",
        arg(id = "postgres_host", long = "postgres-host", env = "POSTGRES_HOST", default_value = "localhost")
    )]
    pub host: String,

    /// Server port.
    #[cfg_attr(
        feature = "config",
        arg(id = "postgres_port", long = "postgres-port", env = "POSTGRES_PORT", default_value = "5432")
    )]
    pub port: u16,

    /// Role name.
    #[cfg_attr(
        feature = "config",
        arg(long = "postgres-user", env = "POSTGRES_USER", default_value = "postgres")
    )]
    pub user: String,

    /// Role password.
    #[cfg_attr(feature = "config", arg(long = "postgres-password", env = "POSTGRES_PASSWORD"))]
    pub password: Option<String>,

    /// Database name.
    #[cfg_attr(
        feature = "config",
        arg(long = "postgres-dbname", env = "POSTGRES_DBNAME", default_value = "postgres")
    )]
    pub dbname: String,

    /// Schema put on the `search_path`.
    #[cfg_attr(feature = "config", arg(long = "postgres-schema", env = "POSTGRES_SCHEMA"))]
    pub schema: Option<String>,

    /// `sslmode` connection parameter.
    #[cfg_attr(
        feature = "config",
        arg(long = "postgres-sslmode", env = "POSTGRES_SSLMODE", default_value = "prefer")
    )]
    pub sslmode: String,

    /// Maximum number of pooled connections.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "postgres-max-connections",
            env = "POSTGRES_MAX_CONNECTIONS",
            default_value = "10"
        )
    )]
    pub max_connections: u32,

    /// Connection timeout in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "postgres-connection-timeout-secs",
            env = "POSTGRES_CONNECTION_TIMEOUT_SECS"
        )
    )]
    pub connection_timeout_secs: Option<u64>,

    /// Idle connection timeout in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "postgres-idle-timeout-secs", env = "POSTGRES_IDLE_TIMEOUT_SECS")
    )]
    pub idle_timeout_secs: Option<u64>,

    /// Logs every query.
    #[cfg_attr(feature = "config", arg(long = "postgres-trace", env = "POSTGRES_TRACE"))]
    pub trace: bool,

    /// Runs every request inside a transaction.
    #[cfg_attr(
        feature = "config",
        arg(long = "postgres-transactional", env = "POSTGRES_TRANSACTIONAL")
    )]
    pub transactional: bool,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_owned(),
            port: 5432,
            user: "postgres".to_owned(),
            password: None,
            dbname: "postgres".to_owned(),
            schema: None,
            sslmode: "prefer".to_owned(),
            max_connections: 10,
            connection_timeout_secs: None,
            idle_timeout_secs: None,
            trace: false,
            transactional: false,
        }
    }
}

impl PgConfig {
    /// Creates a configuration from a connection URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Creates a configuration from connection parts.
    pub fn from_parts(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        dbname: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            dbname: dbname.into(),
            ..Default::default()
        }
    }

    /// Sets the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the schema put on the `search_path`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the `sslmode` parameter.
    pub fn with_sslmode(mut self, sslmode: impl Into<String>) -> Self {
        self.sslmode = sslmode.into();
        self
    }

    /// Sets the maximum number of pooled connections.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Sets the connection timeout in seconds.
    pub fn with_connection_timeout_secs(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = Some(secs);
        self
    }

    /// Sets the idle timeout in seconds.
    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = Some(secs);
        self
    }

    /// Enables or disables query tracing.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Enables or disables per-request transactions.
    pub fn with_transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    /// Returns the connection timeout as a Duration.
    #[inline]
    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the idle timeout as a Duration.
    #[inline]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the string handed to the driver.
    ///
    /// Without a URL the parts are rendered as `key=value` pairs.
    pub fn connection_string(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|url| !url.is_empty()) {
            return url.to_owned();
        }

        let mut pairs = vec![
            format!("host={}", quote(&self.host)),
            format!("port={}", self.port),
            format!("user={}", quote(&self.user)),
            format!("dbname={}", quote(&self.dbname)),
            format!("sslmode={}", quote(&self.sslmode)),
        ];

        if let Some(password) = &self.password {
            pairs.push(format!("password={}", quote(password)));
        }

        if let Some(schema) = self.schema.as_deref().filter(|schema| !schema.is_empty()) {
            pairs.push(format!("options={}", quote(&format!("-c search_path={schema}"))));
        }

        pairs.join(" ")
    }

    /// Returns the connection string with the password masked.
    pub fn connection_string_masked(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|url| !url.is_empty()) {
            return mask_url(url);
        }

        let mut masked = self.clone();
        if masked.password.is_some() {
            masked.password = Some("***".to_owned());
        }
        masked.connection_string()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> PgResult<()> {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() => {
                if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                    tracing::warn!(
                        target: TRACING_TARGET_CONNECTION,
                        "Database URL may not be a PostgreSQL URL"
                    );
                }
            }
            _ if self.host.is_empty() || self.dbname.is_empty() => {
                return Err(PgError::Config(
                    "either url or host and dbname must be set".to_owned(),
                ));
            }
            _ => {}
        }

        if !(MIN_CONNECTIONS..=MAX_CONNECTIONS).contains(&self.max_connections) {
            return Err(PgError::Config(format!(
                "max_connections must be between {MIN_CONNECTIONS} and {MAX_CONNECTIONS}"
            )));
        }

        if let Some(timeout) = self.connection_timeout_secs
            && !(MIN_CONN_TIMEOUT_SECS..=MAX_CONN_TIMEOUT_SECS).contains(&timeout)
        {
            return Err(PgError::Config(format!(
                "connection_timeout_secs must be between {MIN_CONN_TIMEOUT_SECS} and {MAX_CONN_TIMEOUT_SECS}"
            )));
        }

        if let Some(timeout) = self.idle_timeout_secs
            && !(MIN_IDLE_TIMEOUT_SECS..=MAX_IDLE_TIMEOUT_SECS).contains(&timeout)
        {
            return Err(PgError::Config(format!(
                "idle_timeout_secs must be between {MIN_IDLE_TIMEOUT_SECS} and {MAX_IDLE_TIMEOUT_SECS}"
            )));
        }

        Ok(())
    }

    /// Validates the configuration and builds a client.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CONNECTION)]
    pub fn build(self) -> PgResult<PgClient> {
        self.validate()?;
        PgClient::new(self)
    }
}

impl fmt::Debug for PgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConfig")
            .field("connection", &self.connection_string_masked())
            .field("max_connections", &self.max_connections)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("trace", &self.trace)
            .field("transactional", &self.transactional)
            .finish()
    }
}

/// Quotes a `key=value` parameter value when needed.
fn quote(value: &str) -> String {
    let plain = !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if plain {
        return value.to_owned();
    }

    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Masks the password of a connection URL.
fn mask_url(url: &str) -> String {
    let start = url.find("://").map_or(0, |pos| pos + 3);
    if let Some(at_pos) = url[start..].find('@')
        && let Some(colon_pos) = url[start..start + at_pos].find(':')
    {
        let mut masked = url.to_owned();
        masked.replace_range(start + colon_pos + 1..start + at_pos, "***");
        return masked;
    }

    url.to_owned()
}
