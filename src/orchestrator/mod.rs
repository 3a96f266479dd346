//! The cache orchestrator: fetch-or-populate, explicit caching, and eviction.
//!
//! Every entry point fingerprints the request and (except eviction) claims
//! the key in the in-flight registry *before* returning, then drives the rest
//! of the run on a spawned Tokio task. Outcomes arrive on the returned
//! [`Events`].
//!
//! ```text
//! fetch_or_populate:
//!   acquire ─► probe ─┬─ fresh ──► fetch payload ─► Fetched + Completed(cached)
//!                     ├─ error ──► Fetched + Completed(RequestError)
//!                     └─ missing / expired
//!                          ├─ !auto_fetch ─► Fetched + Completed(NoData | CachedRecordExpired)
//!                          └─ origin ─► Completed(origin) ─► should cache? ─► write(Overwrite) ─► Stored
//!
//! cache_request:
//!   acquire ─► origin ─► Responded ─► probe ─► pick write policy ─► should cache? ─► write ─► Stored
//! ```

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::fingerprint::{self, CacheKey};
use crate::http::{Request, Response};
use crate::inflight::{InFlightGuard, InFlightRegistry};
use crate::policy::{self, CachePolicy, PolicyResolver, ShouldCache};
use crate::store::{RecordStore, WritePolicy};
use crate::transport::Transport;

pub mod events;
mod write;

pub use events::{CacheEvent, Events};

use events::Reporter;

/// Why the store could not answer a fetch.
enum Miss {
    Missing,
    Expired { stale: Option<Bytes> },
}

impl Miss {
    fn into_error(self) -> CacheError {
        match self {
            Self::Missing => CacheError::NoData,
            Self::Expired { stale } => CacheError::CachedRecordExpired { stale },
        }
    }
}

/// Caches origin responses in a record store.
///
/// Cheap to clone; clones share the in-flight registry and collaborators.
/// Entry points spawn onto the current Tokio runtime. Called outside one,
/// they deliver [`CacheError::NoRuntime`] instead of starting the run.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rcache::config::CacheConfig;
/// use rcache::http::Request;
/// use rcache::store::MemoryStore;
/// use rcache::transport::Http1Transport;
/// use rcache::CacheOrchestrator;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = CacheConfig::default();
/// let cache = CacheOrchestrator::new(
///     Arc::new(Http1Transport::new(config.transport.clone())),
///     Arc::new(MemoryStore::new()),
///     &config,
/// );
///
/// let mut events = cache.fetch_or_populate(Request::get("http://127.0.0.1:8080/items"), true);
/// if let Some((cached, Ok(payload))) = events.completion().await {
///     println!("{} bytes (from cache: {cached})", payload.len());
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct CacheOrchestrator {
    transport: Arc<dyn Transport>,
    store: Arc<dyn RecordStore>,
    policy: CachePolicy,
    resolver: Option<PolicyResolver>,
    should_cache: ShouldCache,
    in_flight: Arc<InFlightRegistry>,
}

impl CacheOrchestrator {
    /// Creates an orchestrator using `config.policy` as the global policy.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn RecordStore>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            transport,
            store,
            policy: config.policy.clone(),
            resolver: None,
            should_cache: policy::cache_always(),
            in_flight: Arc::new(InFlightRegistry::new()),
        }
    }

    /// Installs a per-request policy override. Returning `None` falls back to
    /// the global policy.
    #[must_use]
    pub fn with_policy_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Request) -> Option<CachePolicy> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Installs the predicate deciding whether an origin response is stored.
    #[must_use]
    pub fn with_should_cache<F>(mut self, should_cache: F) -> Self
    where
        F: Fn(&Response, &Request) -> bool + Send + Sync + 'static,
    {
        self.should_cache = Arc::new(should_cache);
        self
    }

    /// The global policy.
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// The registry of keys with a run in progress.
    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    fn policy_for(&self, request: &Request) -> CachePolicy {
        self.resolver
            .as_ref()
            .and_then(|resolve| resolve(request))
            .unwrap_or_else(|| self.policy.clone())
    }

    /// The runtime to spawn runs on.
    fn runtime() -> Result<Handle, CacheError> {
        Handle::try_current().map_err(|e| {
            warn!(error = %e, "cache entry point called outside a Tokio runtime");
            CacheError::NoRuntime
        })
    }

    /// Fingerprints `request` and claims its key.
    fn claim(&self, request: &Request) -> Result<InFlightGuard, CacheError> {
        let key = fingerprint::fingerprint(request)?;
        self.in_flight.try_acquire(&key).ok_or_else(|| {
            warn!(%key, url = request.url(), "request already in flight");
            CacheError::AlreadyProcessing { key }
        })
    }

    /// Returns the cached payload for `request` when fresh; otherwise, when
    /// `auto_fetch` is set, calls the origin, returns its payload, and stores it.
    ///
    /// Deliveries: `Fetched` and `Completed` for the cache read (only
    /// `Completed` when the origin answered), then `Retrying`* and `Stored`
    /// when a write was attempted.
    pub fn fetch_or_populate(&self, request: Request, auto_fetch: bool) -> Events {
        let (reporter, events) = events::channel();
        match Self::runtime().and_then(|rt| Ok((rt, self.claim(&request)?))) {
            Ok((runtime, guard)) => {
                let this = self.clone();
                runtime.spawn(async move {
                    this.run_fetch(request, guard, auto_fetch, reporter).await;
                });
            }
            Err(err) => reporter.fetch_failed(err),
        }
        events
    }

    /// Calls the origin for `request` and stores the response.
    ///
    /// A fresh existing record is only replaced if nobody else changed it in
    /// the meantime; a stale or missing one is overwritten unconditionally.
    ///
    /// Deliveries: `Responded`, then `Retrying`* and `Stored`.
    pub fn cache_request(&self, request: Request) -> Events {
        let (reporter, events) = events::channel();
        match Self::runtime().and_then(|rt| Ok((rt, self.claim(&request)?))) {
            Ok((runtime, guard)) => {
                let this = self.clone();
                runtime.spawn(async move {
                    this.run_cache(request, guard, reporter).await;
                });
            }
            Err(err) => reporter.request_failed(err),
        }
        events
    }

    /// Deletes the cached record for `request`. Delivers one `Removed`.
    ///
    /// Not deduplicated against in-flight runs.
    pub fn remove_cached_request(&self, request: Request) -> Events {
        let (reporter, events) = events::channel();
        match Self::runtime() {
            Ok(runtime) => {
                let this = self.clone();
                runtime.spawn(async move {
                    let result = this.evict(&request).await.map(|_| ());
                    reporter.removed(result);
                });
            }
            Err(err) => reporter.removed(Err(err)),
        }
        events
    }

    /// Deletes the cached record for `request`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// [`CacheError::MalformedRequest`] or [`CacheError::Request`] for store
    /// failures; an absent record is not an error.
    pub async fn evict(&self, request: &Request) -> Result<bool, CacheError> {
        let key = fingerprint::fingerprint(request)?;
        let existed = self.store.delete(&key).await.inspect_err(|e| {
            warn!(%key, error = %e, "eviction failed");
        })?;
        debug!(%key, existed, "evicted");
        Ok(existed)
    }

    async fn run_fetch(
        self,
        request: Request,
        guard: InFlightGuard,
        auto_fetch: bool,
        reporter: Reporter,
    ) {
        let policy = self.policy_for(&request);
        let key = guard.key().clone();

        let miss = match self.read_cached(&key, &policy, auto_fetch).await {
            Ok(Ok(payload)) => {
                info!(%key, bytes = payload.len(), "cache hit");
                guard.release();
                reporter.fetched(Ok(payload.clone()));
                reporter.completed(true, Ok(payload));
                return;
            }
            Ok(Err(miss)) => miss,
            Err(err) => {
                guard.release();
                reporter.fetch_failed(err);
                return;
            }
        };

        if !auto_fetch {
            debug!(%key, "cache miss, auto-fetch disabled");
            guard.release();
            reporter.fetch_failed(miss.into_error());
            return;
        }

        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%key, error = %e, "origin request failed");
                guard.release();
                reporter.fetch_failed(e.into());
                return;
            }
        };
        reporter.completed(false, Ok(response.payload().clone()));

        if !(self.should_cache)(&response, &request) {
            debug!(%key, status = response.status(), "response declined for caching");
            guard.release();
            reporter.stored(Err(CacheError::NotCached));
            return;
        }

        // The previous record is known to be stale or gone.
        let result = write::persist(
            self.store.as_ref(),
            &request,
            response.into_payload(),
            WritePolicy::Overwrite,
            &policy,
            &reporter,
        )
        .await;
        guard.release();
        reporter.stored(result);
    }

    /// Reads the record for `key`: the payload if fresh, otherwise why not.
    ///
    /// The outer error is a genuine store failure.
    async fn read_cached(
        &self,
        key: &CacheKey,
        policy: &CachePolicy,
        auto_fetch: bool,
    ) -> Result<Result<Bytes, Miss>, CacheError> {
        let Some(meta) = self.store.probe_metadata(key).await.inspect_err(|e| {
            warn!(%key, error = %e, "metadata probe failed");
        })?
        else {
            debug!(%key, "no cached record");
            return Ok(Err(Miss::Missing));
        };

        if policy.is_expired_at(meta.last_modified, Utc::now()) {
            debug!(%key, last_modified = %meta.last_modified, "cached record expired");
            // The stale payload is only worth transferring when it will be
            // handed back in `CachedRecordExpired`.
            let stale = if auto_fetch {
                None
            } else {
                self.store.fetch_payload(key).await.ok().flatten()
            };
            return Ok(Err(Miss::Expired { stale }));
        }

        match self.store.fetch_payload(key).await {
            Ok(Some(payload)) => Ok(Ok(payload)),
            Ok(None) => {
                debug!(%key, "record vanished between probe and fetch");
                Ok(Err(Miss::Missing))
            }
            Err(e) => {
                warn!(%key, error = %e, "payload fetch failed");
                Err(e.into())
            }
        }
    }

    async fn run_cache(self, request: Request, guard: InFlightGuard, reporter: Reporter) {
        let policy = self.policy_for(&request);
        let key = guard.key().clone();

        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%key, error = %e, "origin request failed");
                guard.release();
                reporter.request_failed(e.into());
                return;
            }
        };
        reporter.responded(Ok(response.clone()));

        let write_policy = match self.store.probe_metadata(&key).await {
            Ok(Some(meta)) if !policy.is_expired_at(meta.last_modified, Utc::now()) => {
                WritePolicy::IfUnchanged(meta.change_token)
            }
            Ok(_) => WritePolicy::Overwrite,
            Err(e) => {
                warn!(%key, error = %e, "unable to check existing record, overwriting");
                WritePolicy::Overwrite
            }
        };

        if !(self.should_cache)(&response, &request) {
            debug!(%key, status = response.status(), "response declined for caching");
            guard.release();
            reporter.stored(Err(CacheError::NotCached));
            return;
        }

        let result = write::persist(
            self.store.as_ref(),
            &request,
            response.into_payload(),
            write_policy,
            &policy,
            &reporter,
        )
        .await;
        guard.release();
        reporter.stored(result);
    }
}

impl std::fmt::Debug for CacheOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOrchestrator")
            .field("policy", &self.policy)
            .field("has_resolver", &self.resolver.is_some())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
