//! Error types surfaced through deferred load results.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// The failure a waiter observes when a load cannot produce a value.
///
/// Every waiter attached to the same [`Deferred`](crate::Deferred) sees the same outcome, so
/// the error is cheap to clone: the batch function's error is shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The batch function returned an error for the batch this key was part of.
    #[error("batch fetch failed: {0}")]
    Fetch(Arc<anyhow::Error>),

    /// The batch function did not complete within the configured batch timeout.
    #[error("batch fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The owning scope was cancelled before the key was fetched.
    #[error("scope was cancelled")]
    Cancelled,

    /// The owning scope already finished its unit of work.
    #[error("scope is closed")]
    ScopeClosed,

    /// A loader identity was reused for a loader of a different key, value or batch function
    /// type.
    #[error("loader identity {identity} is already bound to a different loader type")]
    LoaderMismatch { identity: String },
}

impl LoadError {
    pub(crate) fn fetch(error: anyhow::Error) -> Self {
        LoadError::Fetch(Arc::new(error))
    }
}

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;
