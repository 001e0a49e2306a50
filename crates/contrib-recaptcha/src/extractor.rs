//! Where the captcha response is read from.

use std::fmt;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, header};

use crate::{RESPONSE_KEY, RecaptchaError, RecaptchaResult};

/// Largest form body buffered to look for the response field.
const MAX_FORM_BYTES: usize = 64 * 1024;

type CustomExtractor = Arc<dyn Fn(&Request) -> RecaptchaResult<Option<String>> + Send + Sync>;

/// Reads the captcha response from a request.
///
/// Empty values count as missing.
#[derive(Clone)]
pub enum ResponseExtractor {
    /// A request header.
    Header(String),
    /// A field of an `application/x-www-form-urlencoded` body.
    FormField(String),
    /// A user supplied function.
    Custom(CustomExtractor),
}

impl Default for ResponseExtractor {
    fn default() -> Self {
        Self::Header(RESPONSE_KEY.to_owned())
    }
}

impl ResponseExtractor {
    /// Reads the response from the named header.
    pub fn header(name: impl Into<String>) -> Self {
        Self::Header(name.into())
    }

    /// Reads the response from the named form field.
    pub fn form_field(name: impl Into<String>) -> Self {
        Self::FormField(name.into())
    }

    /// Wraps a custom function.
    pub fn custom<F>(extractor: F) -> Self
    where
        F: Fn(&Request) -> RecaptchaResult<Option<String>> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(extractor))
    }

    /// Extracts the response, handing back the request for the next handler.
    ///
    /// Form bodies are buffered and restored so handlers can still read them.
    pub async fn extract(&self, request: Request) -> RecaptchaResult<(Request, Option<String>)> {
        match self {
            Self::Header(name) => {
                let value = from_headers(request.headers(), name);
                Ok((request, value))
            }
            Self::FormField(name) => from_form(request, name).await,
            Self::Custom(extractor) => {
                let value = extractor(&request)?.filter(|value| !value.is_empty());
                Ok((request, value))
            }
        }
    }
}

impl fmt::Debug for ResponseExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(name) => f.debug_tuple("Header").field(name).finish(),
            Self::FormField(name) => f.debug_tuple("FormField").field(name).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

pub(crate) fn from_headers(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

async fn from_form(request: Request, name: &str) -> RecaptchaResult<(Request, Option<String>)> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    if !is_form {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|error| RecaptchaError::Extraction(error.to_string()))?;

    let value = url::form_urlencoded::parse(&bytes)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty());

    Ok((Request::from_parts(parts, Body::from(bytes)), value))
}
