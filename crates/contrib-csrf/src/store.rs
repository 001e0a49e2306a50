//! Authenticated cookie encoding of the base token.
//!
//! Layout before base64url: `timestamp (8, big endian) | token | hmac`, where
//! the MAC covers `cookie name | timestamp | token`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use jiff::Timestamp;
use sha2::Sha256;

use crate::{CsrfError, CsrfResult};

type HmacSha256 = Hmac<Sha256>;

/// Base token length in bytes.
pub(crate) const TOKEN_LEN: usize = 32;

/// Minimum authentication key length in bytes.
pub(crate) const MIN_KEY_LEN: usize = 32;

const TIMESTAMP_LEN: usize = 8;
const MAC_LEN: usize = 32;
const ENCODED_LEN: usize = TIMESTAMP_LEN + TOKEN_LEN + MAC_LEN;

pub(crate) type Token = [u8; TOKEN_LEN];

/// Signs and verifies token cookies.
#[derive(Clone)]
pub(crate) struct CookieStore {
    mac: HmacSha256,
    name: String,
    max_age: u64,
}

impl CookieStore {
    pub(crate) fn new(auth_key: &[u8], name: String, max_age: u64) -> CsrfResult<Self> {
        let weak = || CsrfError::WeakAuthKey {
            min: MIN_KEY_LEN,
            len: auth_key.len(),
        };

        if auth_key.len() < MIN_KEY_LEN {
            return Err(weak());
        }

        let mac = HmacSha256::new_from_slice(auth_key).map_err(|_| weak())?;
        Ok(Self { mac, name, max_age })
    }

    fn sign(&self, timestamp: &[u8], token: &[u8]) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(self.name.as_bytes());
        mac.update(timestamp);
        mac.update(token);
        mac
    }

    /// Encodes `token` with the current time.
    pub(crate) fn encode(&self, token: &Token) -> String {
        self.encode_at(token, Timestamp::now().as_second())
    }

    fn encode_at(&self, token: &Token, timestamp: i64) -> String {
        let timestamp = timestamp.to_be_bytes();
        let tag = self.sign(&timestamp, token).finalize().into_bytes();

        let mut value = Vec::with_capacity(ENCODED_LEN);
        value.extend_from_slice(&timestamp);
        value.extend_from_slice(token);
        value.extend_from_slice(&tag);
        URL_SAFE_NO_PAD.encode(value)
    }

    /// Returns the token of a valid, unexpired cookie value.
    pub(crate) fn decode(&self, value: &str) -> Option<Token> {
        let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
        if bytes.len() != ENCODED_LEN {
            return None;
        }

        let (timestamp, rest) = bytes.split_at(TIMESTAMP_LEN);
        let (token, tag) = rest.split_at(TOKEN_LEN);
        self.sign(timestamp, token).verify_slice(tag).ok()?;

        let issued = i64::from_be_bytes(timestamp.try_into().ok()?);
        let age = Timestamp::now().as_second().saturating_sub(issued);
        if self.max_age > 0 && age > i64::try_from(self.max_age).unwrap_or(i64::MAX) {
            return None;
        }

        token.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn store() -> CookieStore {
        CookieStore::new(KEY, "_csrf".into(), 3600).expect("valid key")
    }

    #[test]
    fn test_encode_decode() {
        let store = store();
        let token = [7u8; TOKEN_LEN];

        let value = store.encode(&token);
        assert_eq!(store.decode(&value), Some(token));
    }

    #[test]
    fn test_tampered_value() {
        let store = store();
        let mut value = store.encode(&[7u8; TOKEN_LEN]).into_bytes();
        let last = value.len() - 1;
        value[last] = if value[last] == b'A' { b'B' } else { b'A' };

        let value = String::from_utf8(value).expect("ascii");
        assert_eq!(store.decode(&value), None);
    }

    #[test]
    fn test_other_cookie_name() {
        let value = store().encode(&[7u8; TOKEN_LEN]);
        let other = CookieStore::new(KEY, "other".into(), 3600).expect("valid key");
        assert_eq!(other.decode(&value), None);
    }

    #[test]
    fn test_expired() {
        let store = store();
        let issued = Timestamp::now().as_second() - 7200;
        let value = store.encode_at(&[7u8; TOKEN_LEN], issued);
        assert_eq!(store.decode(&value), None);
    }

    #[test]
    fn test_weak_key() {
        assert!(matches!(
            CookieStore::new(b"short", "_csrf".into(), 3600),
            Err(CsrfError::WeakAuthKey { min: 32, len: 5 })
        ));
    }
}
