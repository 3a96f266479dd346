//! Origin response value and HTTP/1.x response parsing using [`httparse`].

use bytes::Bytes;
use thiserror::Error;

use super::Headers;

/// Errors that can occur while parsing an origin response.
#[derive(Debug, Clone, Error)]
pub enum ResponseError {
    #[error("response is incomplete: connection closed before headers ended")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("response body is shorter than Content-Length ({received} of {expected} bytes)")]
    TruncatedBody { expected: usize, received: usize },

    #[error("unsupported transfer encoding: {encoding}")]
    UnsupportedEncoding { encoding: String },
}

/// A response received from the origin: status, headers and payload.
///
/// # Examples
///
/// ```
/// use rcache::http::Response;
///
/// let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
/// let response = Response::parse(raw).unwrap();
///
/// assert_eq!(response.status(), 200);
/// assert!(response.is_success());
/// assert_eq!(&response.payload()[..], b"hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Maximum number of headers we accept per response.
    const MAX_HEADERS: usize = 64;

    /// Creates a response with the given status and an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response payload.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parses a complete HTTP/1.x response (head and body) from `buf`.
    ///
    /// The body is everything after the header terminator, cut to
    /// `Content-Length` when that header is present.
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`]: the header block never terminated.
    /// - [`ResponseError::Parse`]: the status line or headers are malformed.
    /// - [`ResponseError::TruncatedBody`]: fewer bytes than `Content-Length` announced.
    /// - [`ResponseError::UnsupportedEncoding`]: a `Transfer-Encoding` other than `identity`.
    pub fn parse(buf: &[u8]) -> Result<Self, ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let status = raw
            .code
            .ok_or(ResponseError::MissingField { field: "status" })?;

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        if let Some(encoding) = header_map.get("transfer-encoding") {
            if !encoding.trim().eq_ignore_ascii_case("identity") {
                return Err(ResponseError::UnsupportedEncoding {
                    encoding: encoding.to_owned(),
                });
            }
        }

        let rest = &buf[body_offset..];
        let body = match header_map
            .get("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            Some(expected) if rest.len() < expected => {
                return Err(ResponseError::TruncatedBody {
                    expected,
                    received: rest.len(),
                });
            }
            Some(expected) => Bytes::copy_from_slice(&rest[..expected]),
            None => Bytes::copy_from_slice(rest),
        };

        Ok(Self {
            status,
            headers: header_map,
            body,
        })
    }

    /// Returns the numeric status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response payload.
    pub fn payload(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the response, returning the payload.
    pub fn into_payload(self) -> Bytes {
        self.body
    }
}
