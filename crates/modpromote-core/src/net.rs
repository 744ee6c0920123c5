//! Bounded collaborator calls.

use std::future::Future;
use std::time::Duration;

use modpromote_sources::{SourceError, SourceResult};

/// Await `call`, failing with `SourceError::Timeout` once `limit` elapses.
pub async fn bounded<T, F>(limit: Duration, resource: String, call: F) -> SourceResult<T>
where
    F: Future<Output = SourceResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout {
            resource,
            after_secs: limit.as_secs(),
        }),
    }
}
