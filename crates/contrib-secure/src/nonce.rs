//! Per-request content security policy nonces.

use axum::extract::{FromRequestParts, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;

/// Nonce bytes before encoding.
const NONCE_LEN: usize = 16;

/// A random nonce generated for one request.
///
/// Only present when a configured policy contains `$NONCE`. Templates use the
/// raw value in `<script nonce="...">` attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspNonce(String);

impl CspNonce {
    pub(crate) fn generate() -> Self {
        let bytes = rand::random::<[u8; NONCE_LEN]>();
        Self(STANDARD_NO_PAD.encode(bytes))
    }

    /// Returns the encoded nonce.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the CSP source expression, `'nonce-<value>'`.
    pub fn source(&self) -> String {
        format!("'nonce-{}'", self.0)
    }
}

/// Returns the nonce generated for this request, if any.
pub fn csp_nonce(request: &Request) -> Option<&str> {
    request.extensions().get::<CspNonce>().map(CspNonce::as_str)
}

impl<S> FromRequestParts<S> for CspNonce
where
    S: Sync + Send,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "content security policy nonce is not available",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_is_unpadded_base64() {
        let nonce = CspNonce::generate();
        let decoded = STANDARD_NO_PAD.decode(nonce.as_str()).expect("valid base64");

        assert_eq!(decoded.len(), NONCE_LEN);
        assert!(!nonce.as_str().ends_with('='));
        assert_eq!(nonce.source(), format!("'nonce-{}'", nonce.as_str()));
    }

    #[test]
    fn test_nonces_differ() {
        assert_ne!(CspNonce::generate(), CspNonce::generate());
    }
}
