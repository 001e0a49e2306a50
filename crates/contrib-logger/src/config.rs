//! Request logger configuration.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

/// Request logger configuration.
///
/// Every field toggle defaults to on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[serde(default)]
pub struct LoggerConfig {
    /// Paths that are never logged.
    #[cfg_attr(
        feature = "config",
        arg(long = "log-skip-paths", env = "LOG_SKIP_PATHS", value_delimiter = ',')
    )]
    pub skip_paths: Vec<String>,

    /// Formats the time in UTC instead of the local time zone.
    #[cfg_attr(feature = "config", arg(long = "log-utc", env = "LOG_UTC"))]
    pub utc: bool,

    /// strftime pattern for an extra `time` field, e.g. `%Y-%m-%dT%H:%M:%S%:z`.
    #[cfg_attr(feature = "config", arg(long = "log-time-format", env = "LOG_TIME_FORMAT"))]
    pub time_format: Option<String>,

    /// Records the response status.
    #[cfg_attr(feature = "config", arg(skip = true))]
    pub status: bool,

    /// Records the client IP.
    #[cfg_attr(feature = "config", arg(skip = true))]
    pub ip: bool,

    /// Records the request method.
    #[cfg_attr(feature = "config", arg(skip = true))]
    pub method: bool,

    /// Records the request path.
    #[cfg_attr(feature = "config", arg(skip = true))]
    pub path: bool,

    /// Records the raw query string.
    #[cfg_attr(feature = "config", arg(skip = true))]
    pub query: bool,

    /// Records the `User-Agent` header.
    #[cfg_attr(feature = "config", arg(skip = true))]
    pub user_agent: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            skip_paths: Vec::new(),
            utc: false,
            time_format: None,
            status: true,
            ip: true,
            method: true,
            path: true,
            query: true,
            user_agent: true,
        }
    }
}

impl LoggerConfig {
    /// Sets the paths that are never logged.
    pub fn with_skip_paths<I, T>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.skip_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the strftime pattern of the `time` field.
    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        self.time_format = Some(format.into());
        self
    }

    /// Formats times in UTC.
    pub fn with_utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }

    /// Records only the status, method and path, like a classic access log.
    pub fn minimal() -> Self {
        Self {
            ip: false,
            query: false,
            user_agent: false,
            ..Default::default()
        }
    }

    /// Returns whether `path` is skipped.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|skipped| skipped == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggerConfig::default();
        assert!(config.status && config.ip && config.method && config.path);
        assert!(config.query && config.user_agent);
        assert!(config.time_format.is_none());
    }

    #[test]
    fn test_skip_paths() {
        let config = LoggerConfig::default().with_skip_paths(["/health", "/metrics"]);
        assert!(config.is_skipped("/health"));
        assert!(!config.is_skipped("/health/deep"));
    }

    #[test]
    fn test_minimal() {
        let config = LoggerConfig::minimal();
        assert!(config.status && config.method && config.path);
        assert!(!config.ip && !config.query && !config.user_agent);
    }
}
