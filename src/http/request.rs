//! Outbound HTTP request value and its HTTP/1.x wire encoding.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use url::Url;

use super::{Headers, Method};

/// Errors raised when a [`Request`] cannot be interpreted.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URL `{url}` has no host")]
    MissingHost { url: String },

    #[error("unsupported URL scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },

    /// A header name or value would break the request framing.
    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },
}

/// A request destined for the origin API.
///
/// Built with a fluent API; the URL is kept as given and only parsed when the
/// request is fingerprinted, stored, or sent, so a malformed request surfaces
/// as an error at that point rather than at construction.
///
/// # Examples
///
/// ```
/// use rcache::http::{Method, Request};
///
/// let request = Request::new(Method::Post, "https://api.example.com/search")
///     .header("Accept", "application/json")
///     .body(r#"{"q":"rust"}"#);
///
/// assert_eq!(request.method(), &Method::Post);
/// assert_eq!(request.headers().get("accept"), Some("application/json"));
/// assert_eq!(request.parsed_url().unwrap().host_str(), Some("api.example.com"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    url: String,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Shorthand for a `POST` request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Appends a request header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the URL exactly as it was given.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body bytes.
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Checks that the request has a usable method and an absolute URL with a host.
    ///
    /// # Errors
    ///
    /// - [`RequestError::MissingField`]: the method or URL is blank.
    /// - [`RequestError::InvalidUrl`]: the URL is not an absolute URL.
    /// - [`RequestError::MissingHost`]: the URL has no host component.
    pub fn parsed_url(&self) -> Result<Url, RequestError> {
        if self.method.is_blank() {
            return Err(RequestError::MissingField { field: "method" });
        }
        if self.url.trim().is_empty() {
            return Err(RequestError::MissingField { field: "url" });
        }
        let url = Url::parse(&self.url).map_err(|source| RequestError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(RequestError::MissingHost {
                url: self.url.clone(),
            });
        }
        Ok(url)
    }

    /// Serializes the request into HTTP/1.0 wire format.
    ///
    /// HTTP/1.0 keeps the origin from answering with a chunked body and
    /// makes it close the connection after the response. Adds `Host`,
    /// `Content-Length` (when there is a body) and `Connection: close`
    /// unless the caller already set them.
    ///
    /// # Errors
    ///
    /// Any [`parsed_url`](Self::parsed_url) error,
    /// [`RequestError::UnsupportedScheme`] for anything but `http`, or
    /// [`RequestError::InvalidHeader`] when a header name is empty or not a
    /// single token, or a value contains CR, LF or NUL.
    pub fn to_wire(&self) -> Result<BytesMut, RequestError> {
        let url = self.parsed_url()?;
        if url.scheme() != "http" {
            return Err(RequestError::UnsupportedScheme {
                scheme: url.scheme().to_owned(),
            });
        }
        if let Some((name, _)) = self
            .headers
            .iter()
            .find(|(name, value)| !is_header_name(name) || !is_header_value(value))
        {
            return Err(RequestError::InvalidHeader {
                name: name.escape_debug().to_string(),
            });
        }

        let mut target = url.path().to_owned();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        let estimated_size = 128 + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("{} {} HTTP/1.0\r\n", self.method, target).as_bytes());

        if !self.headers.contains("host") {
            // Checked by `parsed_url`.
            let host = url.host_str().unwrap_or_default();
            match url.port() {
                Some(port) => buf.put(format!("Host: {host}:{port}\r\n").as_bytes()),
                None => buf.put(format!("Host: {host}\r\n").as_bytes()),
            }
        }

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        if !self.body.is_empty() && !self.headers.contains("content-length") {
            buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        if !self.headers.contains("connection") {
            buf.put(&b"Connection: close\r\n"[..]);
        }

        buf.put(&b"\r\n"[..]);
        buf.put(self.body.as_ref());

        Ok(buf)
    }
}

fn is_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b':')
}

fn is_header_value(value: &str) -> bool {
    !value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0'))
}
