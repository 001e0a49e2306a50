//! Username lookup shared by the enforcer and handlers.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, Request};
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::{Authorization, HeaderMapExt};

/// Username stored in the request extensions by an earlier middleware.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Username(pub String);

impl Username {
    /// Returns the username.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn lookup(extensions: &Extensions, headers: &HeaderMap) -> Self {
        if let Some(username) = extensions.get::<Self>().filter(|name| !name.0.is_empty()) {
            return username.clone();
        }

        headers
            .typed_get::<Authorization<Basic>>()
            .map(|auth| Self(auth.username().to_owned()))
            .unwrap_or_default()
    }
}

/// Stores the username the enforcer should use for this request.
pub fn set_username<B>(request: &mut Request<B>, username: impl Into<String>) {
    request.extensions_mut().insert(Username(username.into()));
}

/// Returns the username set with [`set_username`], otherwise the user of the
/// `Authorization: Basic` header, otherwise an empty string.
pub fn username<B>(request: &Request<B>) -> String {
    Username::lookup(request.extensions(), request.headers()).0
}

impl<S> FromRequestParts<S> for Username
where
    S: Sync + Send,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::lookup(&parts.extensions, &parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{HeaderValue, header};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use super::*;

    fn basic(user: &str, password: &str) -> HeaderValue {
        let encoded = STANDARD.encode(format!("{user}:{password}"));
        HeaderValue::from_str(&format!("Basic {encoded}")).expect("valid header")
    }

    #[test]
    fn test_empty_without_credentials() {
        let request = Request::new(Body::empty());
        assert_eq!(username(&request), "");
    }

    #[test]
    fn test_basic_auth() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, basic("alice", "alicepass"));

        assert_eq!(username(&request), "alice");
    }

    #[test]
    fn test_stored_username_wins() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, basic("alice", "alicepass"));
        set_username(&mut request, "bob");

        assert_eq!(username(&request), "bob");
    }
}
