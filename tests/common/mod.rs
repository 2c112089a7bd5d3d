#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scoped_dataload::BatchFunction;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging once per test binary.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Batch function over a fixed table that records the keys of every call it receives.
pub struct TableBatch<V> {
    table: Arc<HashMap<u64, V>>,
    calls: Arc<Mutex<Vec<Vec<u64>>>>,
    delay: Option<Duration>,
}

impl<V> Clone for TableBatch<V> {
    fn clone(&self) -> Self {
        Self { table: Arc::clone(&self.table), calls: Arc::clone(&self.calls), delay: self.delay }
    }
}

impl<V> TableBatch<V> {
    pub fn new<I: IntoIterator<Item = (u64, V)>>(entries: I) -> Self {
        Self {
            table: Arc::new(entries.into_iter().collect()),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Key sets received so far, each sorted, in call order.
    pub fn calls(&self) -> Vec<Vec<u64>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> BatchFunction<u64, V> for TableBatch<V> {
    async fn load(&self, keys: &[u64]) -> anyhow::Result<HashMap<u64, V>> {
        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        self.calls.lock().push(sorted);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(keys.iter().filter_map(|k| self.table.get(k).cloned().map(|v| (*k, v))).collect())
    }
}

/// Batch function whose every call fails.
#[derive(Clone, Default)]
pub struct FailingBatch {
    calls: Arc<AtomicUsize>,
}

impl FailingBatch {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchFunction<u64, String> for FailingBatch {
    async fn load(&self, _keys: &[u64]) -> anyhow::Result<HashMap<u64, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("backend unavailable")
    }
}
