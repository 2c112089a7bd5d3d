//! Configuration for a scope and its drain loop.

use std::time::Duration;

/// Configuration for a [`Scope`](crate::Scope).
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    /// Number of times the drain loop yields to the caller's logic after dequeuing a loader and
    /// before firing its batch. Continuations woken by the previous batch use these yields to
    /// register their keys, so they join the batch instead of opening a new one.
    pub yield_count: usize,
    /// Largest number of keys handed to a batch function in one call. A batch window holding more
    /// keys is fetched in sequential chunks. `None` means unbounded.
    pub max_batch_size: Option<usize>,
    /// Time limit for fetching one batch window, covering all of its chunks when
    /// `max_batch_size` splits it. A batch that exceeds it fails with
    /// [`LoadError::Timeout`](crate::LoadError::Timeout).
    pub batch_timeout: Option<Duration>,
    /// Label attached to the scope's tracing span.
    pub name: Option<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self { yield_count: 1, max_batch_size: None, batch_timeout: None, name: None }
    }
}

impl ScopeConfig {
    /// Sets the number of yields before each batch fires.
    pub fn with_yield_count(mut self, yield_count: usize) -> Self {
        self.yield_count = yield_count;
        self
    }

    /// Limits how many keys a single batch function call receives. Zero is treated as one.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size.max(1));
        self
    }

    /// Sets the time limit for fetching one batch window.
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    /// Sets the label used in the scope's tracing span.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
