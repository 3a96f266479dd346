//! Origin transport seam.
//!
//! The cache engine calls the origin through the [`Transport`] trait: one
//! attempt per call, no retries at this layer. [`Http1Transport`] is a small
//! plain-HTTP implementation; embedders with richer needs (TLS, pooling)
//! implement the trait over their own client.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::{Request, RequestError, Response, ResponseError};

pub mod http1;

pub use http1::Http1Transport;

/// Errors produced while calling the origin.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("cannot send request: {0}")]
    Request(#[from] RequestError),

    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },

    #[error("origin did not answer within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("response exceeds maximum allowed size of {max_bytes} bytes")]
    ResponseTooLarge { max_bytes: usize },

    #[error("invalid response: {0}")]
    Response(#[from] ResponseError),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` for failures that say nothing about the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Io { .. } | Self::Timeout { .. }
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

/// Sends a request to the origin API.
///
/// # Contract
///
/// - One attempt per call; the engine never expects the transport to retry.
/// - Any HTTP status counts as success. Deciding whether a 4xx/5xx payload is
///   worth caching is the should-cache predicate's job.
/// - Implementations bound their own waiting; the engine adds no timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the request and returns the origin's response.
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}
