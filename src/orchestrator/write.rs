//! Shared write path: turn a request and payload into a record and persist
//! it through the retry scheduler.

use bytes::Bytes;
use tracing::{debug, info};

use super::events::Reporter;
use crate::error::CacheError;
use crate::http::Request;
use crate::policy::CachePolicy;
use crate::retry::{RetryState, run_with_retry};
use crate::store::{CacheRecord, RecordStore, WritePolicy};

/// Persists `payload` as the cached answer to `request`.
///
/// Returns the payload on success so it can be handed straight to the
/// `Stored` delivery.
pub(crate) async fn persist(
    store: &dyn RecordStore,
    request: &Request,
    payload: Bytes,
    write_policy: WritePolicy,
    policy: &CachePolicy,
    reporter: &Reporter,
) -> Result<Bytes, CacheError> {
    let record = CacheRecord::from_request(request, payload.clone())?;
    let key = record.key.clone();
    debug!(%key, ?write_policy, bytes = payload.len(), "persisting record");

    let meta = run_with_retry(
        move || store.write(record.clone(), write_policy),
        RetryState::from_policy(policy),
        |notice| reporter.retrying(notice),
    )
    .await?;

    info!(%key, change_token = meta.change_token, "record stored");
    Ok(payload)
}
