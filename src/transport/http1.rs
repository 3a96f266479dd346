//! Plain HTTP/1.x origin transport over Tokio.
//!
//! Opens one TCP connection per request, writes the request in HTTP/1.0 form
//! (so the origin closes the connection and never chunks the body), then
//! buffers the response until EOF and parses it.

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{Transport, TransportError};
use crate::config::TransportConfig;
use crate::http::{Request, RequestError, Response};

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// A [`Transport`] that speaks plain HTTP/1.x to the origin.
///
/// # Examples
///
/// ```rust,no_run
/// use rcache::config::TransportConfig;
/// use rcache::http::Request;
/// use rcache::transport::{Http1Transport, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Http1Transport::new(TransportConfig::default());
/// let response = transport.send(&Request::get("http://127.0.0.1:8080/items")).await?;
/// println!("{} bytes", response.payload().len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Http1Transport {
    config: TransportConfig,
}

impl Http1Transport {
    /// Creates a transport with the given limits.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    async fn exchange(&self, request: &Request) -> Result<Response, TransportError> {
        let url = request.parsed_url()?;
        let wire = request.to_wire()?;

        let host = url.host_str().ok_or_else(|| RequestError::MissingHost {
            url: request.url().to_owned(),
        })?;
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = format!("{host}:{port}");

        let mut stream =
            TcpStream::connect(&addr)
                .await
                .map_err(|e| TransportError::Connect {
                    addr: addr.clone(),
                    reason: e.to_string(),
                })?;

        debug!(%addr, method = %request.method(), "sending request to origin");
        stream.write_all(&wire).await?;
        stream.flush().await?;

        let max_bytes = self.config.max_response_bytes;
        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        loop {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if bytes_read == 0 {
                break;
            }
            if buf.len() > max_bytes {
                return Err(TransportError::ResponseTooLarge { max_bytes });
            }
        }

        let response = Response::parse(&buf)?;
        debug!(%addr, status = response.status(), bytes = response.payload().len(), "origin responded");
        Ok(response)
    }
}

#[async_trait]
impl Transport for Http1Transport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let timeout = self.config.timeout;
        match tokio::time::timeout(timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout { timeout }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;

    /// Accepts one connection, reads the request head, replies with `reply`.
    async fn one_shot_origin(reply: &'static [u8]) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 1024];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
            }
            stream.write_all(reply).await.unwrap();
            stream.shutdown().await.unwrap();
            received
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn fetches_payload_from_origin() {
        let (base, origin) =
            one_shot_origin(b"HTTP/1.0 200 OK\r\nContent-Length: 7\r\n\r\npayload").await;
        let transport = Http1Transport::default();

        let response = transport
            .send(&Request::get(format!("{base}/things?id=1")).header("Accept", "text/plain"))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(&response.payload()[..], b"payload");

        let seen = String::from_utf8(origin.await.unwrap()).unwrap();
        assert!(seen.starts_with("GET /things?id=1 HTTP/1.0\r\n"));
        assert!(seen.contains("Accept: text/plain\r\n"));
    }

    #[tokio::test]
    async fn oversized_response_is_rejected() {
        let (base, _origin) =
            one_shot_origin(b"HTTP/1.0 200 OK\r\n\r\nthis body is far too long").await;
        let transport = Http1Transport::new(TransportConfig {
            max_response_bytes: 16,
            ..TransportConfig::default()
        });

        let err = transport.send(&Request::get(base)).await.unwrap_err();
        assert!(matches!(err, TransportError::ResponseTooLarge { max_bytes: 16 }));
    }

    #[tokio::test]
    async fn silent_origin_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let transport = Http1Transport::new(TransportConfig {
            timeout: Duration::from_millis(50),
            ..TransportConfig::default()
        });
        let err = transport
            .send(&Request::get(format!("http://{addr}/")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn https_urls_fail_before_connecting() {
        let err = Http1Transport::default()
            .send(&Request::get("https://example.com/"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Request(RequestError::UnsupportedScheme { .. })
        ));
    }
}
