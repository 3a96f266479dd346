//! HTTP value types exchanged with the origin.
//!
//! [`Request`] and [`Response`] are plain values with no connection state.
//! Cache-control headers from the origin are carried but never interpreted.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::{Request, RequestError};
pub use response::{Response, ResponseError};

/// Request method, as it appears on the request line and in the fingerprint.
///
/// Parsing is case-sensitive: `"get"` is a [`Method::Custom`] and
/// fingerprints differently from [`Method::Get`].
///
/// ```
/// use rcache::http::Method;
///
/// let method: Method = "PATCH".parse().unwrap();
/// assert_eq!(method, Method::Patch);
/// assert_eq!(method.to_string(), "PATCH");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    /// Any other token, kept verbatim.
    Custom(String),
}

impl Method {
    /// The method token as written on the request line.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Custom(token) => token,
        }
    }

    /// Methods that never change origin state.
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }

    /// `true` for an empty token or one containing whitespace; such a method
    /// cannot be sent or fingerprinted.
    pub fn is_blank(&self) -> bool {
        let token = self.as_str();
        token.is_empty() || token.contains(char::is_whitespace)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Infallible;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let method = match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            other => Self::Custom(other.to_owned()),
        };
        Ok(method)
    }
}
