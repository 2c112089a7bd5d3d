use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LoadError;

/// The unit the drain loop works on: a loader with an open, non-empty batch window.
///
/// Loaders queue themselves on their scope exactly when their window goes from empty to
/// non-empty, so a loader is in the ready queue at most once at a time. The queue holds them type
/// erased, since one scope owns loaders of many key and value types.
#[async_trait]
pub(crate) trait Batch: Send + Sync {
    /// Human readable loader identity, used in logs.
    fn identity(&self) -> &str;

    /// Closes the open window, fetches its keys and completes every deferred of the window.
    /// Keys registered while the fetch is in flight open the next window.
    async fn execute(&self);

    /// Closes the open window and fails its deferreds with `error` without fetching. Returns the
    /// number of keys abandoned.
    fn abandon(&self, error: LoadError) -> usize;
}

pub(crate) type ReadyBatch = Arc<dyn Batch>;
