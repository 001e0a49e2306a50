//! Validated tokens in the request extensions.

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request};
use axum::http::request::Parts;
use jsonwebtoken::Header;

use crate::JwtError;

/// A verified token.
#[derive(Debug, Clone)]
pub struct Token<C = serde_json::Value> {
    /// Encoded token as received.
    pub raw: String,
    /// Decoded header.
    pub header: Header,
    /// Decoded claims.
    pub claims: C,
}

/// Returns the token validated for this request.
pub fn get<C>(request: &Request) -> Option<&Token<C>>
where
    C: Clone + Send + Sync + 'static,
{
    request.extensions().get::<Token<C>>()
}

impl<S, C> FromRequestParts<S> for Token<C>
where
    S: Sync + Send,
    C: Clone + Send + Sync + 'static,
{
    type Rejection = JwtError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(JwtError::MissingToken)
    }
}

impl<S, C> OptionalFromRequestParts<S> for Token<C>
where
    S: Sync + Send,
    C: Clone + Send + Sync + 'static,
{
    type Rejection = JwtError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}
