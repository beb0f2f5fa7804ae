//! Best-effort background work whose failures are discarded by construction.

use std::future::Future;

use tokio::runtime::Handle;
use tracing::debug;

/// Spawn `fut` on `handle` without keeping its join handle.
///
/// An error result is logged at debug level and dropped; nothing is returned
/// to the caller and nothing is retried.
pub fn spawn_detached<F>(handle: &Handle, label: &'static str, fut: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    handle.spawn(async move {
        if let Err(e) = fut.await {
            debug!(task = label, error = %e, "detached task failed");
        }
    });
}
