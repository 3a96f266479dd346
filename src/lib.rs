//! # rcache
//!
//! Request-level response caching in front of an origin API, backed by a
//! remote record store with optimistic concurrency.
//!
//! For each outbound request the [`CacheOrchestrator`] decides whether a
//! stored response is still fresh enough to return or whether the origin must
//! be called and the result persisted. Concurrent runs for the same request
//! are refused rather than duplicated, and contended writes back off
//! exponentially within the policy's retry budget.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rcache::{CacheConfig, CacheEvent, CacheOrchestrator, Request};
//! use rcache::store::MemoryStore;
//! use rcache::transport::Http1Transport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CacheConfig::from_json_str(r#"{"policy": {"max_age": "ten_minutes"}}"#)?;
//!     let cache = CacheOrchestrator::new(
//!         Arc::new(Http1Transport::new(config.transport.clone())),
//!         Arc::new(MemoryStore::new()),
//!         &config,
//!     )
//!     .with_should_cache(|response, _request| response.is_success());
//!
//!     let events = cache.fetch_or_populate(Request::get("http://127.0.0.1:8080/feed"), true);
//!     for event in events.collect().await {
//!         match event {
//!             CacheEvent::Completed { cached, result } => println!("cached={cached} {result:?}"),
//!             CacheEvent::Stored(result) => println!("stored: {:?}", result.is_ok()),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// ── Value types and collaborator seams ────────────────────────────────────────
pub mod config;
pub mod error;
pub mod http;
pub mod store;
pub mod transport;

// ── Cache engine ──────────────────────────────────────────────────────────────
pub mod fingerprint;
pub mod inflight;
pub mod orchestrator;
pub mod policy;
pub mod retry;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::CacheConfig;
pub use error::{CacheError, RequestFailure, TemporaryError};
pub use fingerprint::{CacheKey, fingerprint};
pub use http::{Headers, Method, Request, Response};
pub use orchestrator::{CacheEvent, CacheOrchestrator, Events};
pub use policy::{CachePolicy, MaxAge};
