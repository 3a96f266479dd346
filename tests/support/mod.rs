//! Scripted collaborators for orchestrator tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use rcache::fingerprint::CacheKey;
use rcache::http::{Request, Response};
use rcache::store::{CacheRecord, MemoryStore, RecordMetadata, RecordStore, StoreError, WritePolicy};
use rcache::transport::{Transport, TransportError};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Origin that replays queued outcomes, then answers `200 payload`.
#[derive(Default)]
pub struct FakeOrigin {
    outcomes: Mutex<VecDeque<Result<Response, TransportError>>>,
    calls: AtomicUsize,
    hold: Option<Arc<Notify>>,
}

impl FakeOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// An origin that waits for `gate` to be notified before answering.
    pub fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            hold: Some(gate),
            ..Self::default()
        })
    }

    pub fn push(&self, outcome: Result<Response, TransportError>) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeOrigin {
    async fn send(&self, _request: &Request) -> Result<Response, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.hold {
            gate.notified().await;
        }
        let next = self.outcomes.lock().pop_front();
        next.unwrap_or_else(|| Ok(Response::new(200).body("payload")))
    }
}

/// A [`MemoryStore`] with injectable failures and a log of write policies.
#[derive(Default)]
pub struct ScriptedStore {
    inner: MemoryStore,
    probe_failures: Mutex<VecDeque<StoreError>>,
    write_failures: Mutex<VecDeque<StoreError>>,
    delete_failures: Mutex<VecDeque<StoreError>>,
    writes: Mutex<Vec<WritePolicy>>,
    probes: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_probe(&self, err: StoreError) {
        self.probe_failures.lock().push_back(err);
    }

    pub fn fail_write(&self, err: StoreError) {
        self.write_failures.lock().push_back(err);
    }

    pub fn fail_delete(&self, err: StoreError) {
        self.delete_failures.lock().push_back(err);
    }

    pub fn seed(&self, request: &Request, payload: &'static str, last_modified: DateTime<Utc>) -> RecordMetadata {
        let record = CacheRecord::from_request(request, Bytes::from(payload)).unwrap();
        self.inner.insert_at(record, last_modified)
    }

    pub fn payload(&self, key: &CacheKey) -> Option<Bytes> {
        self.inner.get(key).map(|(record, _)| record.payload)
    }

    pub fn writes(&self) -> Vec<WritePolicy> {
        self.writes.lock().clone()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn probe_metadata(&self, key: &CacheKey) -> Result<Option<RecordMetadata>, StoreError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let failure = self.probe_failures.lock().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        self.inner.probe_metadata(key).await
    }

    async fn fetch_payload(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        self.inner.fetch_payload(key).await
    }

    async fn write(
        &self,
        record: CacheRecord,
        policy: WritePolicy,
    ) -> Result<RecordMetadata, StoreError> {
        self.writes.lock().push(policy);
        let failure = self.write_failures.lock().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        self.inner.write(record, policy).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let failure = self.delete_failures.lock().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        self.inner.delete(key).await
    }
}

pub fn conflict() -> StoreError {
    StoreError::Conflict {
        key: "contended".into(),
    }
}

pub fn unavailable() -> StoreError {
    StoreError::Unavailable {
        reason: "store offline".into(),
    }
}
