//! The narrow capability handed to the watcher so it can kick off a
//! reindex without holding a back-pointer to its owner (spec §9, "Cyclic
//! references": the daemon owns the watcher, the watcher only needs to
//! call back into one method).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Implemented by whoever owns the indexing pipeline (the daemon). The
/// watcher calls `trigger` once per settled batch; it never sees the
/// store, the config, or any other daemon state.
#[async_trait]
pub trait IndexTrigger: Send + Sync {
    async fn trigger_indexing(&self, changed_paths: Vec<String>, cancel: CancellationToken) -> Result<(), String>;
}
