//! Delivery of run outcomes to the caller.
//!
//! Each run writes into an unbounded channel; the caller drains the matching
//! [`Events`] receiver on whichever task it wants outcomes handled on. The
//! channel closes once the run has reached its terminal outcome and released
//! its key.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{CacheError, TemporaryError};
use crate::http::Response;

/// One delivery from a run.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// Outcome of reading the cache (fetch-or-populate only).
    Fetched(Result<Bytes, CacheError>),
    /// Overall outcome of fetch-or-populate. `cached` tells whether the
    /// payload came from the store.
    Completed {
        cached: bool,
        result: Result<Bytes, CacheError>,
    },
    /// Outcome of the origin call (explicit caching only).
    Responded(Result<Response, CacheError>),
    /// A contended write is about to back off and retry.
    Retrying(TemporaryError),
    /// Outcome of persisting the payload.
    Stored(Result<Bytes, CacheError>),
    /// Outcome of an eviction.
    Removed(Result<(), CacheError>),
}

/// Receiving half of a run's deliveries.
///
/// Dropping it does not stop the run; deliveries are discarded instead.
#[derive(Debug)]
pub struct Events {
    rx: mpsc::UnboundedReceiver<CacheEvent>,
}

impl Events {
    /// Waits for the next delivery. `None` once the run is over.
    pub async fn next(&mut self) -> Option<CacheEvent> {
        self.rx.recv().await
    }

    /// Waits for the run to finish and returns every delivery in order.
    pub async fn collect(mut self) -> Vec<CacheEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }

    /// Waits for the `Completed` delivery of a fetch-or-populate run.
    ///
    /// Later deliveries (`Stored`, `Retrying`) stay queued for [`next`](Self::next).
    pub async fn completion(&mut self) -> Option<(bool, Result<Bytes, CacheError>)> {
        while let Some(event) = self.rx.recv().await {
            if let CacheEvent::Completed { cached, result } = event {
                return Some((cached, result));
            }
        }
        None
    }

    /// Waits for the `Stored` delivery, skipping everything before it.
    pub async fn stored(&mut self) -> Option<Result<Bytes, CacheError>> {
        while let Some(event) = self.rx.recv().await {
            if let CacheEvent::Stored(result) = event {
                return Some(result);
            }
        }
        None
    }
}

/// Sending half, owned by the run.
#[derive(Debug, Clone)]
pub(crate) struct Reporter {
    tx: mpsc::UnboundedSender<CacheEvent>,
}

pub(crate) fn channel() -> (Reporter, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Reporter { tx }, Events { rx })
}

impl Reporter {
    fn send(&self, event: CacheEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub(crate) fn fetched(&self, result: Result<Bytes, CacheError>) {
        self.send(CacheEvent::Fetched(result));
    }

    pub(crate) fn completed(&self, cached: bool, result: Result<Bytes, CacheError>) {
        self.send(CacheEvent::Completed { cached, result });
    }

    /// Delivers the same failure as both `Fetched` and `Completed`.
    pub(crate) fn fetch_failed(&self, err: CacheError) {
        self.fetched(Err(err.clone()));
        self.completed(false, Err(err));
    }

    pub(crate) fn responded(&self, result: Result<Response, CacheError>) {
        self.send(CacheEvent::Responded(result));
    }

    /// Delivers the same failure as both `Responded` and `Stored`.
    pub(crate) fn request_failed(&self, err: CacheError) {
        self.responded(Err(err.clone()));
        self.stored(Err(err));
    }

    pub(crate) fn retrying(&self, notice: TemporaryError) {
        self.send(CacheEvent::Retrying(notice));
    }

    pub(crate) fn stored(&self, result: Result<Bytes, CacheError>) {
        self.send(CacheEvent::Stored(result));
    }

    pub(crate) fn removed(&self, result: Result<(), CacheError>) {
        self.send(CacheEvent::Removed(result));
    }
}
