//! Compiled CORS policy shared by the guard and the [`CorsLayer`].

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method, request};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer, ExposeHeaders};

use crate::{CorsConfig, CorsError, CorsResult};

/// Allowed origins, either everything or an explicit list.
#[derive(Debug, Clone)]
enum Origins {
    Any,
    List {
        exact: Vec<String>,
        wildcards: Vec<(String, String)>,
    },
}

/// Validated CORS rules.
///
/// Origin and header comparisons are case-insensitive.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: Origins,
    methods: Vec<Method>,
    headers: Option<Vec<HeaderName>>,
    exposed: Vec<HeaderName>,
    config: CorsConfig,
}

impl CorsPolicy {
    /// Compiles a [`CorsConfig`] into a policy.
    pub fn new(config: &CorsConfig) -> CorsResult<Self> {
        if config.allow_credentials && config.allowed_origins.iter().any(|origin| origin == "*") {
            return Err(CorsError::CredentialsWithAnyOrigin);
        }

        let origins = parse_origins(&config.allowed_origins)?;

        let methods = config
            .effective_methods()
            .into_iter()
            .map(|method| {
                Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| CorsError::InvalidMethod(method.to_owned()))
            })
            .collect::<CorsResult<Vec<_>>>()?;

        let requested = config.effective_headers();
        let headers = if requested.contains(&"*") {
            None
        } else {
            Some(parse_headers(requested)?)
        };

        if config.exposed_headers.iter().any(|header| header == "*") && config.allow_credentials {
            return Err(CorsError::CredentialsWithWildcard);
        }

        let exposed = parse_headers(config.exposed_headers.iter().map(String::as_str))?;

        Ok(Self {
            origins,
            methods,
            headers,
            exposed,
            config: config.clone(),
        })
    }

    /// Returns whether the `Origin` header value is allowed.
    pub fn is_origin_allowed(&self, origin: &HeaderValue) -> bool {
        let Ok(origin) = origin.to_str() else {
            return false;
        };

        match &self.origins {
            Origins::Any => true,
            Origins::List { exact, wildcards } => {
                let origin = origin.to_ascii_lowercase();
                exact.iter().any(|allowed| *allowed == origin)
                    || wildcards.iter().any(|(prefix, suffix)| {
                        origin.len() >= prefix.len() + suffix.len()
                            && origin.starts_with(prefix.as_str())
                            && origin.ends_with(suffix.as_str())
                    })
            }
        }
    }

    /// Returns whether a preflight may request the method.
    pub fn is_method_allowed(&self, method: &Method) -> bool {
        // Preflights are always OPTIONS themselves.
        *method == Method::OPTIONS || self.methods.contains(method)
    }

    /// Returns whether a preflight may request the header.
    pub fn is_header_allowed(&self, header: &str) -> bool {
        match &self.headers {
            None => true,
            Some(headers) => headers
                .iter()
                .any(|allowed| allowed.as_str().eq_ignore_ascii_case(header.trim())),
        }
    }

    /// Returns the configuration this policy was compiled from.
    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    /// Builds the [`CorsLayer`] that writes the response headers.
    pub fn into_layer(self: Arc<Self>) -> CorsLayer {
        let allow_origin = match (&self.origins, self.config.allow_credentials) {
            (Origins::Any, false) => AllowOrigin::any(),
            (Origins::Any, true) => AllowOrigin::mirror_request(),
            (Origins::List { .. }, _) => {
                let policy = Arc::clone(&self);
                AllowOrigin::predicate(move |origin: &HeaderValue, _: &request::Parts| {
                    policy.is_origin_allowed(origin)
                })
            }
        };

        let allow_headers = match (&self.headers, self.config.allow_credentials) {
            (Some(headers), _) => AllowHeaders::list(headers.clone()),
            (None, false) => AllowHeaders::any(),
            (None, true) => AllowHeaders::mirror_request(),
        };

        let mut layer = CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(self.methods.clone())
            .allow_headers(allow_headers)
            .allow_credentials(self.config.allow_credentials);

        if self.config.exposed_headers.iter().any(|header| header == "*") {
            layer = layer.expose_headers(ExposeHeaders::any());
        } else if !self.exposed.is_empty() {
            layer = layer.expose_headers(self.exposed.clone());
        }

        if let Some(max_age) = self.config.max_age() {
            layer = layer.max_age(max_age);
        }

        layer
    }
}

fn parse_origins(origins: &[String]) -> CorsResult<Origins> {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return Ok(Origins::Any);
    }

    let mut exact = Vec::new();
    let mut wildcards = Vec::new();

    for origin in origins {
        let lowered = origin.trim().to_ascii_lowercase();
        if HeaderValue::from_str(&lowered).is_err() {
            return Err(CorsError::InvalidOrigin(origin.clone()));
        }

        match lowered.matches('*').count() {
            0 => exact.push(lowered),
            1 => {
                let (prefix, suffix) = lowered
                    .split_once('*')
                    .ok_or_else(|| CorsError::InvalidOrigin(origin.clone()))?;
                wildcards.push((prefix.to_owned(), suffix.to_owned()));
            }
            _ => return Err(CorsError::InvalidOrigin(origin.clone())),
        }
    }

    Ok(Origins::List { exact, wildcards })
}

fn parse_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> CorsResult<Vec<HeaderName>> {
    headers
        .into_iter()
        .filter(|header| *header != "*")
        .map(|header| {
            HeaderName::from_bytes(header.trim().as_bytes())
                .map_err(|_| CorsError::InvalidHeader(header.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(config: CorsConfig) -> CorsPolicy {
        CorsPolicy::new(&config).expect("valid config")
    }

    #[test]
    fn test_any_origin_by_default() {
        let policy = policy(CorsConfig::default());
        let origin = HeaderValue::from_static("https://anything.test");
        assert!(policy.is_origin_allowed(&origin));
    }

    #[test]
    fn test_exact_origin_is_case_insensitive() {
        let policy = policy(CorsConfig::default().with_allowed_origins(["https://Example.com"]));

        assert!(policy.is_origin_allowed(&HeaderValue::from_static("https://example.com")));
        assert!(!policy.is_origin_allowed(&HeaderValue::from_static("http://example.com")));
    }

    #[test]
    fn test_wildcard_origin() {
        let policy = policy(CorsConfig::default().with_allowed_origins(["https://*.example.com"]));

        assert!(policy.is_origin_allowed(&HeaderValue::from_static("https://api.example.com")));
        assert!(!policy.is_origin_allowed(&HeaderValue::from_static("https://example.org")));
    }

    #[test]
    fn test_methods() {
        let policy = policy(CorsConfig::default());
        assert!(policy.is_method_allowed(&Method::GET));
        assert!(policy.is_method_allowed(&Method::OPTIONS));
        assert!(!policy.is_method_allowed(&Method::DELETE));
    }

    #[test]
    fn test_headers() {
        let policy = policy(CorsConfig::default().with_allowed_headers(["Content-Type"]));
        assert!(policy.is_header_allowed("content-type"));
        assert!(!policy.is_header_allowed("x-custom"));

        let any = self::policy(CorsConfig::default().with_allowed_headers(["*"]));
        assert!(any.is_header_allowed("x-custom"));
    }

    #[test]
    fn test_credentials_with_wildcard_origin() {
        let config = CorsConfig::default()
            .with_allowed_origins(["*"])
            .with_credentials(true);
        assert!(matches!(
            CorsPolicy::new(&config),
            Err(CorsError::CredentialsWithAnyOrigin)
        ));

        // An empty list reflects the request origin instead.
        let config = CorsConfig::default().with_credentials(true);
        assert!(CorsPolicy::new(&config).is_ok());
    }

    #[test]
    fn test_credentials_with_wildcard_exposed_headers() {
        let config = CorsConfig::default()
            .with_exposed_headers(["*"])
            .with_credentials(true);
        assert!(CorsPolicy::new(&config).is_err());
    }
}
