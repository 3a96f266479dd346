//! Request fingerprinting: deriving a stable [`CacheKey`] from request identity.
//!
//! The key is the SHA-256 of a canonical JSON document:
//!
//! ```text
//! {"body_sha": "<hex or empty>", "header": {"<lowercase name>": ["<values in order>"]},
//!  "method": "<METHOD>", "url": "<normalized absolute URL>"}
//! ```
//!
//! Object keys serialize in sorted order and header names are lowercased, so
//! name casing and the interleaving of different headers do not affect the
//! key. The order of a repeated header's values does.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::http::Request;

/// Identifier of the stored record for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps an already-computed key, e.g. one read back from a store.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest of a request body; the empty string for an empty body.
pub fn body_digest(body: &[u8]) -> String {
    if body.is_empty() {
        String::new()
    } else {
        sha256_hex(body)
    }
}

/// Computes the cache key for `request`.
///
/// Pure and deterministic: requests with identical method, URL, body and
/// headers always map to the same key.
///
/// # Errors
///
/// [`CacheError::MalformedRequest`] when the method is blank or the URL is not
/// an absolute URL with a host.
///
/// # Examples
///
/// ```
/// use rcache::fingerprint::fingerprint;
/// use rcache::http::Request;
///
/// let a = Request::get("http://api.example.com/items").header("Accept", "text/plain");
/// let b = Request::get("http://api.example.com/items").header("accept", "text/plain");
/// let c = Request::get("http://api.example.com/items?page=2");
///
/// assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
/// assert_ne!(fingerprint(&a).unwrap(), fingerprint(&c).unwrap());
/// ```
pub fn fingerprint(request: &Request) -> Result<CacheKey, CacheError> {
    let url = request.parsed_url()?;
    let identity = json!({
        "method": request.method().as_str(),
        "body_sha": body_digest(request.body_bytes()),
        "url": url.as_str(),
        "header": request.headers().canonical(),
    });
    Ok(CacheKey(sha256_hex(identity.to_string().as_bytes())))
}

/// Record kind shared by all requests to one host: `req_<sha256(host)>`.
///
/// # Errors
///
/// [`CacheError::MalformedRequest`] when the URL has no host.
pub fn record_type(request: &Request) -> Result<String, CacheError> {
    let url = request.parsed_url()?;
    // `parsed_url` rejects host-less URLs.
    let host = url.host_str().unwrap_or_default();
    Ok(format!("req_{}", sha256_hex(host.as_bytes())))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::http::Method;

    fn key(request: &Request) -> CacheKey {
        fingerprint(request).unwrap()
    }

    #[test]
    fn key_is_hex_sha256() {
        let k = key(&Request::get("http://example.com/"));
        assert_eq!(k.as_str().len(), 64);
        assert!(k.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn each_identity_field_changes_the_key() {
        let base = Request::post("http://example.com/a")
            .header("X-Token", "1")
            .body("body");
        let k = key(&base);

        assert_ne!(
            k,
            key(&Request::new(Method::Put, "http://example.com/a")
                .header("X-Token", "1")
                .body("body"))
        );
        assert_ne!(
            k,
            key(&Request::post("http://example.com/b")
                .header("X-Token", "1")
                .body("body"))
        );
        assert_ne!(
            k,
            key(&Request::post("http://example.com/a")
                .header("X-Token", "2")
                .body("body"))
        );
        assert_ne!(
            k,
            key(&Request::post("http://example.com/a")
                .header("X-Token", "1")
                .body("other"))
        );
    }

    #[test]
    fn header_order_does_not_matter() {
        let a = Request::get("http://example.com/")
            .header("A", "1")
            .header("B", "2");
        let b = Request::get("http://example.com/")
            .header("b", "2")
            .header("a", "1");
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn repeated_header_value_order_changes_the_key() {
        let a = Request::get("http://example.com/")
            .header("Accept-Language", "fr")
            .header("Accept-Language", "en");
        let b = Request::get("http://example.com/")
            .header("Accept-Language", "en")
            .header("Accept-Language", "fr");
        assert_ne!(key(&a), key(&b));
    }

    #[test]
    fn url_is_normalized_before_hashing() {
        assert_eq!(
            key(&Request::get("HTTP://Example.COM")),
            key(&Request::get("http://example.com/"))
        );
    }

    #[test]
    fn empty_body_has_empty_digest() {
        assert_eq!(body_digest(b""), "");
        assert_eq!(body_digest(b"x").len(), 64);
    }

    #[test]
    fn malformed_requests_are_rejected() {
        for request in [
            Request::get(""),
            Request::get("not a url"),
            Request::new(Method::Custom(String::new()), "http://example.com/"),
        ] {
            assert!(matches!(
                fingerprint(&request),
                Err(CacheError::MalformedRequest { .. })
            ));
        }
    }

    #[test]
    fn record_type_depends_only_on_host() {
        let a = record_type(&Request::get("http://example.com/a")).unwrap();
        let b = record_type(&Request::post("http://example.com/b?x=1")).unwrap();
        let c = record_type(&Request::get("http://other.example.com/a")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("req_"));
    }

    proptest! {
        #[test]
        fn fingerprint_is_deterministic(
            path in "[a-z0-9/]{0,24}",
            body in proptest::collection::vec(any::<u8>(), 0..64),
            header_value in "[ -~]{0,16}",
        ) {
            let make = || Request::post(format!("http://example.com/{path}"))
                .header("X-Value", header_value.clone())
                .body(body.clone());
            prop_assert_eq!(fingerprint(&make()).unwrap(), fingerprint(&make()).unwrap());
        }

        #[test]
        fn different_bodies_give_different_keys(
            a in proptest::collection::vec(any::<u8>(), 0..64),
            b in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            prop_assume!(a != b);
            let ka = fingerprint(&Request::post("http://example.com/").body(a)).unwrap();
            let kb = fingerprint(&Request::post("http://example.com/").body(b)).unwrap();
            prop_assert_ne!(ka, kb);
        }
    }
}
