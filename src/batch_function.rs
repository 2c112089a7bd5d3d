use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

/// A `BatchFunction` defines the method through which some `Loader` may fetch batched data from
/// some resource. The `BatchFunction` receives the deduplicated keys that were requested during the
/// `Loader`'s most recent batch window, in no particular order.
///
/// The `BatchFunction` is not required to return a result for all keys that were provided. It can
/// return any set of loaded key value pairs. Requesters of keys whose values are not returned
/// receive `None` from [`Loader::load`](crate::Loader::load), or an empty list from
/// [`Loader::load_many`](crate::Loader::load_many) for one-to-many shapes (`V = Vec<T>`).
///
/// Returning an error fails every key of the batch with
/// [`LoadError::Fetch`](crate::LoadError::Fetch). Other loaders in the same scope are not affected.
///
/// Any context the function needs (a connection pool, a client) lives in the implementing type;
/// multiple batch functions can share it through an `Arc`.
#[async_trait]
pub trait BatchFunction<K, V>: Send + Sync + 'static {
    async fn load(&self, keys: &[K]) -> anyhow::Result<HashMap<K, V>>;
}

/// Adapts an async closure into a [`BatchFunction`].
///
/// ```ignore
/// let names = scope.loader("names", batch_fn(|ids: Vec<u64>| async move {
///     Ok::<_, anyhow::Error>(ids.into_iter().map(|id| (id, format!("user-{id}"))).collect())
/// }))?;
/// ```
pub fn batch_fn<K, V, F, Fut>(f: F) -> FnBatch<F, K, V>
where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HashMap<K, V>>> + Send + 'static,
{
    FnBatch { f, phantom: PhantomData }
}

/// A [`BatchFunction`] backed by a closure. Created with [`batch_fn`].
pub struct FnBatch<F, K, V> {
    f: F,
    phantom: PhantomData<fn(Vec<K>) -> V>,
}

#[async_trait]
impl<K, V, F, Fut> BatchFunction<K, V> for FnBatch<F, K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HashMap<K, V>>> + Send + 'static,
{
    async fn load(&self, keys: &[K]) -> anyhow::Result<HashMap<K, V>> {
        (self.f)(keys.to_vec()).await
    }
}
