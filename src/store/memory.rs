//! Process-local [`RecordStore`] with change-token concurrency control.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::trace;

use super::{CacheRecord, RecordMetadata, RecordStore, StoreError, WritePolicy};
use crate::fingerprint::CacheKey;

#[derive(Debug)]
struct Stored {
    record: CacheRecord,
    meta: RecordMetadata,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<CacheKey, Stored>,
    next_token: u64,
}

impl State {
    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

/// An in-memory record store.
///
/// Every successful write stamps the record with the current time and a new,
/// strictly increasing change token, so [`WritePolicy::IfUnchanged`] behaves
/// like a remote store's optimistic-concurrency check.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use rcache::http::Request;
/// use rcache::store::{CacheRecord, MemoryStore, RecordStore, WritePolicy};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new();
/// let record = CacheRecord::from_request(&Request::get("http://example.com/"), Bytes::from("hi")).unwrap();
/// let key = record.key.clone();
///
/// let meta = store.write(record, WritePolicy::Overwrite).await.unwrap();
/// assert_eq!(store.probe_metadata(&key).await.unwrap(), Some(meta));
/// assert_eq!(store.fetch_payload(&key).await.unwrap(), Some(Bytes::from("hi")));
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record` with an explicit modification time, bypassing write
    /// policies. Useful for seeding a store with aged records.
    pub fn insert_at(&self, record: CacheRecord, last_modified: DateTime<Utc>) -> RecordMetadata {
        let mut state = self.state.lock();
        let meta = RecordMetadata {
            key: record.key.clone(),
            last_modified,
            change_token: state.issue_token(),
        };
        state.records.insert(
            record.key.clone(),
            Stored {
                record,
                meta: meta.clone(),
            },
        );
        meta
    }

    /// Returns a copy of the stored record and its metadata.
    pub fn get(&self, key: &CacheKey) -> Option<(CacheRecord, RecordMetadata)> {
        self.state
            .lock()
            .records
            .get(key)
            .map(|s| (s.record.clone(), s.meta.clone()))
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn probe_metadata(&self, key: &CacheKey) -> Result<Option<RecordMetadata>, StoreError> {
        Ok(self.state.lock().records.get(key).map(|s| s.meta.clone()))
    }

    async fn fetch_payload(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        Ok(self
            .state
            .lock()
            .records
            .get(key)
            .map(|s| s.record.payload.clone()))
    }

    async fn write(
        &self,
        record: CacheRecord,
        policy: WritePolicy,
    ) -> Result<RecordMetadata, StoreError> {
        let mut state = self.state.lock();

        if let WritePolicy::IfUnchanged(expected) = policy {
            let current = state.records.get(&record.key).map(|s| s.meta.change_token);
            if current != Some(expected) {
                trace!(key = %record.key, expected, ?current, "conditional write lost the race");
                return Err(StoreError::Conflict {
                    key: record.key.to_string(),
                });
            }
        }

        let meta = RecordMetadata {
            key: record.key.clone(),
            last_modified: Utc::now(),
            change_token: state.issue_token(),
        };
        state.records.insert(
            record.key.clone(),
            Stored {
                record,
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError> {
        Ok(self.state.lock().records.remove(key).is_some())
    }
}
