use std::collections::HashMap;
use std::fmt::Debug;
use std::future::{Future, IntoFuture};
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use parking_lot::Mutex;

use crate::{
    batch::{Batch, ReadyBatch},
    batch_function::BatchFunction,
    cache::{KeyCache, Lookup},
    deferred::Deferred,
    error::{LoadError, LoadResult},
    scope::ScopeCore,
};

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Loaders are created through [`Scope::loader`](crate::Scope::loader) and belong to that scope.
/// [`Loader::load`] never waits: it registers the key and hands back a [`Deferred`] right away.
/// All keys registered before the scope's drain loop reaches this loader are fetched together in
/// one call to the batch function, and every key is fetched at most once per scope: repeated
/// requests share the first request's deferred, whether it is still pending or already completed.
///
/// The `Loader` handle is cheap to clone and can be used from any number of tasks.
pub struct Loader<K, V, F> {
    inner: Arc<LoaderInner<K, V, F>>,
}

impl<K, V, F> Clone for Loader<K, V, F> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

pub(crate) struct LoaderInner<K, V, F> {
    identity: String,
    batch_fn: F,
    cache: Mutex<KeyCache<K, V>>,
    core: Arc<ScopeCore>,
}

impl<K, V, F> LoaderInner<K, V, F>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(identity: String, batch_fn: F, core: Arc<ScopeCore>) -> Self {
        Self { identity, batch_fn, cache: Mutex::new(KeyCache::new()), core }
    }
}

impl<K, V, F> Loader<K, V, F> {
    pub(crate) fn from_inner(inner: Arc<LoaderInner<K, V, F>>) -> Self {
        Self { inner }
    }

    /// The identity this loader was registered under, as rendered in logs.
    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Returns true if both handles refer to the same loader.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<K, V, F> Loader<K, V, F>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFunction<K, V>,
{
    /// Requests the value for `key`.
    ///
    /// Resolves to `Ok(None)` if the batch function did not return the key, and to an error if the
    /// batch it was fetched in failed. Loading from a closed or cancelled scope returns a deferred
    /// that has already failed.
    pub fn load(&self, key: K) -> Deferred<Option<V>> {
        let core = &self.inner.core;
        let lookup = {
            let mut cache = self.inner.cache.lock();
            if let Some(error) = core.rejection() {
                tracing::warn!(
                    scope = core.id,
                    loader = %self.inner.identity,
                    ?key,
                    %error,
                    "load rejected"
                );
                return Deferred::failed(error);
            }
            cache.lookup_or_register(key)
        };

        match lookup {
            Lookup::Hit(deferred) => {
                core.record(|stats| stats.record_load_request(true));
                deferred
            }
            Lookup::Miss { deferred, opened_window } => {
                core.record(|stats| stats.record_load_request(false));
                if opened_window {
                    core.enqueue(Arc::clone(&self.inner) as ReadyBatch);
                }
                deferred
            }
        }
    }

    /// Requests several keys at once. Values are returned in the order of `keys`.
    ///
    /// All keys are registered before this returns; the returned future fails with the first
    /// error among them.
    pub fn load_all<I>(
        &self,
        keys: I,
    ) -> impl Future<Output = LoadResult<Vec<Option<V>>>> + Send + 'static
    where
        I: IntoIterator<Item = K>,
    {
        let pending = keys.into_iter().map(|key| self.load(key).into_future()).collect::<Vec<_>>();
        future::try_join_all(pending)
    }

    /// Adds a value to the cache, unless the key was already requested or primed. Returns whether
    /// the value was stored.
    pub fn prime(&self, key: K, value: V) -> bool {
        self.inner.cache.lock().prime(key, value)
    }

    /// Adds many values to the cache at once. Keys that are already known keep their value.
    pub fn prime_many<I>(&self, key_vals: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut cache = self.inner.cache.lock();
        for (key, value) in key_vals {
            cache.prime(key, value);
        }
    }

    /// Removes a completed value from the cache so the key is fetched again when it is next
    /// requested. Keys that are still waiting for their batch are left untouched. Returns whether a
    /// value was removed.
    pub fn clear(&self, key: &K) -> bool {
        self.inner.cache.lock().remove(key)
    }
}

impl<K, T, F> Loader<K, Vec<T>, F>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: BatchFunction<K, Vec<T>>,
{
    /// Requests every value associated with `key`, for one-to-many batch functions.
    ///
    /// A key the batch function did not return resolves to an empty list. The key is registered
    /// before this returns.
    pub fn load_many(&self, key: K) -> impl Future<Output = LoadResult<Vec<T>>> + Send + 'static {
        let deferred = self.load(key);
        async move { deferred.await.map(Option::unwrap_or_default) }
    }
}

impl<K, V, F> LoaderInner<K, V, F>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFunction<K, V>,
{
    /// Calls the batch function for `keys`, in chunks if the scope limits the batch size, racing
    /// the configured timeout and the scope's cancellation.
    async fn fetch(&self, keys: &[K]) -> LoadResult<HashMap<K, V>> {
        let config = &self.core.config;
        let chunk_size = config.max_batch_size.unwrap_or(keys.len()).max(1);

        let fetch_all = async {
            let mut values = HashMap::with_capacity(keys.len());
            for chunk in keys.chunks(chunk_size) {
                self.core.record(|stats| stats.record_fetch_call());
                let loaded = self.batch_fn.load(chunk).await.map_err(LoadError::fetch)?;
                values.extend(loaded);
            }
            Ok::<_, LoadError>(values)
        };

        let bounded = async {
            match config.batch_timeout {
                Some(limit) => match tokio::time::timeout(limit, fetch_all).await {
                    Ok(result) => result,
                    Err(_) => Err(LoadError::Timeout(limit)),
                },
                None => fetch_all.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = self.core.cancelled() => Err(LoadError::Cancelled),
        }
    }
}

#[async_trait]
impl<K, V, F> Batch for LoaderInner<K, V, F>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFunction<K, V>,
{
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn execute(&self) {
        let mut in_flight = InFlight { window: self.cache.lock().take_window() };
        if in_flight.window.is_empty() {
            return;
        }

        let keys = in_flight.window.iter().map(|(key, _)| key.clone()).collect::<Vec<_>>();
        tracing::debug!(batch_size = keys.len(), ?keys, "fetching batch");
        self.core.record(|stats| stats.record_batch(keys.len()));

        match self.fetch(&keys).await {
            Ok(mut loaded) => {
                tracing::debug!(requested = keys.len(), loaded = loaded.len(), "batch loaded");
                for (key, deferred) in in_flight.take() {
                    deferred.resolve(loaded.remove(&key));
                }
            }
            Err(error) => {
                tracing::warn!(%error, batch_size = keys.len(), "batch failed");
                self.core.record(|stats| stats.record_failed_batch());
                for (_, deferred) in in_flight.take() {
                    deferred.fail(error.clone());
                }
            }
        }
    }

    fn abandon(&self, error: LoadError) -> usize {
        let window = self.cache.lock().take_window();
        let abandoned = window.len();
        for (_, deferred) in window {
            deferred.fail(error.clone());
        }
        abandoned
    }
}

/// A batch window taken out of its cache for fetching. If the fetch never completes, e.g. because
/// the unit of work was dropped while it was in flight, the keys still held here fail with
/// [`LoadError::ScopeClosed`] when it drops.
struct InFlight<K, V> {
    window: Vec<(K, Deferred<Option<V>>)>,
}

impl<K, V> InFlight<K, V> {
    fn take(&mut self) -> Vec<(K, Deferred<Option<V>>)> {
        std::mem::take(&mut self.window)
    }
}

impl<K, V> Drop for InFlight<K, V> {
    fn drop(&mut self) {
        if self.window.is_empty() {
            return;
        }
        tracing::warn!(abandoned = self.window.len(), "batch dropped while in flight");
        for (_, deferred) in self.window.drain(..) {
            if !deferred.is_completed() {
                deferred.fail(LoadError::ScopeClosed);
            }
        }
    }
}
