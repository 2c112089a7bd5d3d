/// Counters describing the work a scope performed. A snapshot is available through
/// [`Scope::stats`](crate::Scope::stats), and the final values are logged at `debug` when the scope
/// is dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScopeStats {
    /// Number of `load` calls received by the scope's loaders (including cache hits).
    pub load_requests: u64,
    /// Number of `load` calls answered by an existing deferred (pending or completed).
    pub cache_hits: u64,
    /// Number of batch windows executed by the drain loop.
    pub batches: u64,
    /// Number of batch windows whose fetch failed, timed out or was cancelled.
    pub failed_batches: u64,
    /// Number of batch function invocations. Exceeds `batches` when windows are chunked.
    pub fetch_calls: u64,
    /// Total number of unique keys handed to batch functions.
    pub keys_fetched: u64,
    /// Largest batch window executed.
    pub max_batch_size: u64,
}

impl ScopeStats {
    pub(crate) fn record_load_request(&mut self, cache_hit: bool) {
        self.load_requests += 1;
        if cache_hit {
            self.cache_hits += 1;
        }
    }

    pub(crate) fn record_batch(&mut self, batch_size: usize) {
        let batch_size = batch_size as u64;
        self.batches += 1;
        self.keys_fetched += batch_size;
        if batch_size > self.max_batch_size {
            self.max_batch_size = batch_size;
        }
    }

    pub(crate) fn record_fetch_call(&mut self) {
        self.fetch_calls += 1;
    }

    pub(crate) fn record_failed_batch(&mut self) {
        self.failed_batches += 1;
    }
}
