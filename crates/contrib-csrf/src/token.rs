//! Per-request masked tokens and request extension helpers.

use std::fmt;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::CsrfError;
use crate::store::{TOKEN_LEN, Token};

/// Masked token for the current request.
///
/// A fresh one-time pad is used on every request, so the value differs each
/// time while still validating against the same cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Returns the masked token.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Form field name configured for the current request.
#[derive(Debug, Clone)]
pub(crate) struct CsrfField(pub(crate) String);

/// Why validation failed.
#[derive(Debug, Clone)]
pub(crate) struct FailureReason(pub(crate) CsrfError);

/// Marker that disables validation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SkipCheck;

/// Masks `token` as `base64(pad | pad ^ token)`.
pub(crate) fn mask(token: &Token) -> CsrfToken {
    let pad = rand::random::<Token>();
    let mut out = Vec::with_capacity(TOKEN_LEN * 2);
    out.extend_from_slice(&pad);
    out.extend(pad.iter().zip(token).map(|(pad, byte)| pad ^ byte));
    CsrfToken(STANDARD.encode(out))
}

/// Reverses [`mask`].
pub(crate) fn unmask(masked: &str) -> Option<Token> {
    let bytes = STANDARD.decode(masked.trim()).ok()?;
    if bytes.len() != TOKEN_LEN * 2 {
        return None;
    }

    let (pad, masked) = bytes.split_at(TOKEN_LEN);
    let mut token = [0u8; TOKEN_LEN];
    for (out, (pad, byte)) in token.iter_mut().zip(pad.iter().zip(masked)) {
        *out = pad ^ byte;
    }
    Some(token)
}

/// Compares tokens in constant time.
pub(crate) fn tokens_match(a: &Token, b: &Token) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Returns the masked token for this request.
pub fn token<B>(request: &Request<B>) -> Option<&str> {
    request.extensions().get::<CsrfToken>().map(CsrfToken::as_str)
}

/// Returns a hidden `<input>` carrying the masked token.
pub fn template_field<B>(request: &Request<B>) -> Option<String> {
    let field = request.extensions().get::<CsrfField>()?;
    let token = token(request)?;
    Some(format!(
        r#"<input type="hidden" name="{}" value="{}">"#,
        field.0, token
    ))
}

/// Returns why validation failed, for use in error handlers.
pub fn failure_reason<B>(request: &Request<B>) -> Option<&CsrfError> {
    request
        .extensions()
        .get::<FailureReason>()
        .map(|reason| &reason.0)
}

/// Disables validation for this request.
///
/// Must run before the CSRF middleware.
pub fn skip_check<B>(request: &mut Request<B>) {
    request.extensions_mut().insert(SkipCheck);
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Sync + Send,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "CSRF middleware is not installed",
        ))
    }
}
