//! Remote record store seam.
//!
//! The engine talks to the durable store through [`RecordStore`]. Two
//! distinctions are load-bearing for the orchestrator and must be preserved
//! by every implementation:
//!
//! - "key absent" is `Ok(None)` / `Ok(false)`, never an error;
//! - an optimistic-concurrency conflict is [`StoreError::Conflict`], never
//!   one of the other variants.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::CacheError;
use crate::fingerprint::{self, CacheKey};
use crate::http::Request;

pub mod memory;

pub use memory::MemoryStore;

/// Store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record changed on the server since the writer last saw it.
    #[error("record {key} was modified concurrently")]
    Conflict { key: String },

    /// The store could not be reached or is overloaded.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The store refused the record itself (size, schema, quota).
    #[error("store rejected the record: {reason}")]
    Rejected { reason: String },

    /// The caller lacks permission for the operation.
    #[error("not authorized: {reason}")]
    Unauthorized { reason: String },
}

impl StoreError {
    /// Returns `true` for the optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// How a write treats a record already present under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Replace whatever is stored.
    Overwrite,
    /// Replace only if the stored record still carries this change token;
    /// otherwise fail with [`StoreError::Conflict`]. A record that has
    /// disappeared also counts as changed.
    ///
    /// Retries of a contended write resend the same token. When another
    /// writer really did replace the record, every retry conflicts again and
    /// the write ends in [`CacheError::ContentionExhausted`], leaving the
    /// other writer's record in place; the backoff only delays that outcome.
    IfUnchanged(u64),
}

/// Store-assigned bookkeeping for a record. Carries no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub key: CacheKey,
    pub last_modified: DateTime<Utc>,
    pub change_token: u64,
}

/// The unit persisted per fingerprint: request identity plus the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub key: CacheKey,
    /// Record kind grouping all requests to one host, `req_<sha256(host)>`.
    pub record_type: String,
    pub method: String,
    pub url: String,
    pub url_digest: String,
    pub body_digest: String,
    /// The request headers as a JSON object, name to list of values.
    pub headers_json: String,
    pub payload: Bytes,
}

impl CacheRecord {
    /// Builds the record that caches `payload` as the answer to `request`.
    ///
    /// # Errors
    ///
    /// [`CacheError::MalformedRequest`] when the request has no usable method,
    /// URL or host.
    pub fn from_request(request: &Request, payload: Bytes) -> Result<Self, CacheError> {
        let key = fingerprint::fingerprint(request)?;
        let record_type = fingerprint::record_type(request)?;
        let url = request.parsed_url()?.to_string();
        let headers_json = serde_json::Value::from(
            request
                .headers()
                .canonical()
                .into_iter()
                .map(|(name, values)| (name, serde_json::Value::from(values)))
                .collect::<serde_json::Map<_, _>>(),
        )
        .to_string();

        Ok(Self {
            key,
            record_type,
            method: request.method().as_str().to_owned(),
            url_digest: fingerprint::sha256_hex(url.as_bytes()),
            url,
            body_digest: fingerprint::body_digest(request.body_bytes()),
            headers_json,
            payload,
        })
    }
}

/// A keyed record store with optimistic concurrency.
///
/// # Contract
///
/// - `probe_metadata` must not transfer the payload.
/// - `write` assigns `last_modified` and a fresh `change_token` on success.
/// - `delete` is idempotent: deleting an absent key returns `Ok(false)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the record's metadata, or `None` when no record exists.
    async fn probe_metadata(&self, key: &CacheKey) -> Result<Option<RecordMetadata>, StoreError>;

    /// Returns the record's payload, or `None` when no record exists.
    async fn fetch_payload(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError>;

    /// Persists `record` under `record.key` according to `policy`.
    async fn write(
        &self,
        record: CacheRecord,
        policy: WritePolicy,
    ) -> Result<RecordMetadata, StoreError>;

    /// Removes the record. Returns whether a record was present.
    async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError>;
}
