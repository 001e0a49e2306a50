//! Where tokens are read from.

use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::header;

use crate::{JwtError, JwtResult};

type CustomExtractor = Arc<dyn Fn(&Request) -> JwtResult<Option<String>> + Send + Sync>;

/// Reads the raw token from a request.
///
/// `Ok(None)` means no token was supplied. An error means a token was
/// supplied but in the wrong shape.
#[derive(Clone, Default)]
pub enum TokenExtractor {
    /// `Authorization: Bearer <token>`.
    #[default]
    AuthHeader,
    /// A query string parameter.
    Parameter(String),
    /// The first extractor that finds a token, stopping at the first error.
    First(Vec<TokenExtractor>),
    /// A user supplied function.
    Custom(CustomExtractor),
}

impl TokenExtractor {
    /// Reads the token from the named query string parameter.
    pub fn parameter(name: impl Into<String>) -> Self {
        Self::Parameter(name.into())
    }

    /// Tries each extractor in order.
    pub fn first(extractors: impl IntoIterator<Item = TokenExtractor>) -> Self {
        Self::First(extractors.into_iter().collect())
    }

    /// Wraps a custom function.
    pub fn custom<F>(extractor: F) -> Self
    where
        F: Fn(&Request) -> JwtResult<Option<String>> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(extractor))
    }

    /// Extracts the raw token.
    pub fn extract(&self, request: &Request) -> JwtResult<Option<String>> {
        match self {
            Self::AuthHeader => from_auth_header(request),
            Self::Parameter(name) => Ok(from_parameter(request, name)),
            Self::First(extractors) => {
                for extractor in extractors {
                    if let Some(token) = extractor.extract(request)? {
                        return Ok(Some(token));
                    }
                }
                Ok(None)
            }
            Self::Custom(extractor) => extractor(request),
        }
    }
}

fn from_auth_header(request: &Request) -> JwtResult<Option<String>> {
    let Some(value) = request.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| JwtError::MalformedHeader)?;
    if value.is_empty() {
        return Ok(None);
    }

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
            Ok(Some(token.to_owned()))
        }
        _ => Err(JwtError::MalformedHeader),
    }
}

fn from_parameter(request: &Request, name: &str) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

impl fmt::Debug for TokenExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthHeader => f.write_str("AuthHeader"),
            Self::Parameter(name) => f.debug_tuple("Parameter").field(name).finish(),
            Self::First(extractors) => f.debug_tuple("First").field(extractors).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}
