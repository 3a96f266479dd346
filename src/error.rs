//! Error taxonomy shared by every cache entry point.
//!
//! [`CacheError`] is `Clone` because a single failure is often delivered on
//! more than one event (for example both `Fetched` and `Completed`).

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::fingerprint::CacheKey;
use crate::http::RequestError;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Terminal outcome of a cache operation that did not succeed.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The request cannot be fingerprinted or turned into a stored record.
    #[error("malformed request: {source}")]
    MalformedRequest {
        #[from]
        source: RequestError,
    },

    /// Nothing is cached for the request and auto-fetch was disabled.
    #[error("no cached data for request")]
    NoData,

    /// A record exists but is older than the policy allows, and auto-fetch
    /// was disabled. `stale` carries the expired payload when it could be read.
    #[error("cached record expired")]
    CachedRecordExpired { stale: Option<Bytes> },

    /// The origin or the store failed for a reason other than contention.
    #[error("request failed: {0}")]
    Request(#[from] RequestFailure),

    /// The should-cache predicate declined the payload.
    #[error("response was not cached")]
    NotCached,

    /// Another run for the same fingerprint is still in flight.
    #[error("request {key} is already being processed")]
    AlreadyProcessing { key: CacheKey },

    /// The store kept reporting concurrent modification until the retry
    /// budget ran out.
    #[error("store contention persisted after {attempts} attempts: {cause}")]
    ContentionExhausted { attempts: u32, cause: StoreError },

    /// The entry point was called outside a Tokio runtime, so the run could
    /// not be started.
    #[error("no Tokio runtime to run the request on")]
    NoRuntime,
}

impl CacheError {
    /// Returns `true` when calling again later may succeed without any change
    /// to the request itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AlreadyProcessing { .. } | Self::ContentionExhausted { .. } => true,
            Self::Request(RequestFailure::Transport(e)) => e.is_transient(),
            Self::Request(RequestFailure::Store(e)) => {
                matches!(e, StoreError::Unavailable { .. })
            }
            _ => false,
        }
    }
}

impl From<TransportError> for CacheError {
    fn from(err: TransportError) -> Self {
        Self::Request(RequestFailure::Transport(err))
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        Self::Request(RequestFailure::Store(err))
    }
}

/// Which collaborator a [`CacheError::Request`] came from.
#[derive(Debug, Clone, Error)]
pub enum RequestFailure {
    #[error("origin: {0}")]
    Transport(#[from] TransportError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Progress notice emitted while a write is backing off after contention.
///
/// Not terminal: the write is re-attempted after `delay`, and the run later
/// ends in success or a terminal [`CacheError`].
#[derive(Debug, Clone, Error)]
#[error("temporary store failure ({cause}); retrying in {delay:?}, {retries_left} retries left")]
pub struct TemporaryError {
    pub cause: StoreError,
    pub retries_left: u32,
    pub delay: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conversion_wraps_in_request_failure() {
        let err: CacheError = StoreError::Rejected {
            reason: "payload too large".into(),
        }
        .into();
        assert!(matches!(err, CacheError::Request(RequestFailure::Store(_))));
        assert!(!err.is_retryable());
    }

    #[test]
    fn retryable_classification() {
        assert!(CacheError::AlreadyProcessing {
            key: CacheKey::from_raw("k")
        }
        .is_retryable());
        assert!(CacheError::from(StoreError::Unavailable {
            reason: "down".into()
        })
        .is_retryable());
        assert!(!CacheError::NotCached.is_retryable());
        assert!(!CacheError::NoData.is_retryable());
    }

    #[test]
    fn temporary_error_message_names_budget() {
        let notice = TemporaryError {
            cause: StoreError::Conflict { key: "k".into() },
            retries_left: 2,
            delay: Duration::from_secs(1),
        };
        let text = notice.to_string();
        assert!(text.contains("2 retries left"));
        assert!(text.contains("1s"));
    }
}
