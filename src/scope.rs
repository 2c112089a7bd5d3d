use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::{
    batch::ReadyBatch,
    batch_function::BatchFunction,
    config::ScopeConfig,
    error::{LoadError, LoadResult},
    loader::{Loader, LoaderInner},
    scope_worker::ScopeWorker,
    stats::ScopeStats,
};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// One unit of work's set of loaders, and the queue its drain loop works through.
///
/// A `Scope` is created by [`run`](crate::run) and handed to the caller's logic. Loaders are
/// obtained with [`Scope::loader`] and live exactly as long as the scope: every value a loader
/// fetched stays cached until the unit of work ends, and nothing is shared between scopes.
///
/// `Scope` is a cheap handle; clones refer to the same scope. The scope can also be reached from
/// code that does not receive it as a parameter through [`Scope::current`].
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    core: Arc<ScopeCore>,
    registry: Mutex<Registry>,
}

/// Loaders by identity. Identities of different types live in separate maps, keyed by the
/// identity's `TypeId`; each map holds `HashMap<I, Arc<LoaderInner<..>>>` behind `dyn Any`.
#[derive(Default)]
struct Registry {
    by_identity: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    batches: Vec<ReadyBatch>,
}

type IdentityMap<I> = HashMap<I, Arc<dyn Any + Send + Sync>>;

/// The part of a scope that its loaders hold on to: the ready queue sender and the lifecycle
/// flags. Kept apart from the registry so loaders do not keep their own registry alive.
pub(crate) struct ScopeCore {
    pub(crate) id: u64,
    pub(crate) config: ScopeConfig,
    ready_tx: mpsc::UnboundedSender<ReadyBatch>,
    closed: AtomicBool,
    cancelled: AtomicBool,
    cancel_notify: Notify,
    stats: Mutex<ScopeStats>,
}

impl ScopeCore {
    pub(crate) fn enqueue(&self, batch: ReadyBatch) {
        tracing::trace!(scope = self.id, loader = batch.identity(), "loader ready");
        if let Err(e) = self.ready_tx.send(batch) {
            // Only reachable once the drain loop is gone, at which point the scope is closed and
            // the window is failed by `Scope::close`.
            tracing::error!(scope = self.id, loader = e.0.identity(), "ready queue closed");
        }
    }

    /// Returns the error new loads must fail with, if the scope no longer accepts them.
    pub(crate) fn rejection(&self) -> Option<LoadError> {
        if self.closed.load(Ordering::SeqCst) {
            Some(LoadError::ScopeClosed)
        } else if self.cancelled.load(Ordering::SeqCst) {
            Some(LoadError::Cancelled)
        } else {
            None
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once the scope is cancelled.
    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.cancel_notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn record(&self, f: impl FnOnce(&mut ScopeStats)) {
        f(&mut self.stats.lock());
    }
}

impl Drop for ScopeCore {
    fn drop(&mut self) {
        tracing::debug!(scope = self.id, scope_stats = ?self.stats.get_mut());
    }
}

impl Scope {
    pub(crate) fn new(config: ScopeConfig) -> (Self, ScopeWorker) {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let core = Arc::new(ScopeCore {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            ready_tx,
            closed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
            stats: Mutex::new(ScopeStats::default()),
        });
        let worker = ScopeWorker::new(Arc::clone(&core), ready_rx);
        let inner = ScopeInner { core, registry: Mutex::new(Registry::default()) };
        let scope = Self { inner: Arc::new(inner) };
        (scope, worker)
    }

    /// Returns the loader registered under `identity`, creating it with `batch_fn` on first use.
    ///
    /// Identities are compared by value: every call with an equal identity returns a handle to the
    /// same loader, and `batch_fn` is dropped unused when the loader already exists. Pick
    /// identities that are stable for one fetch shape and distinct across shapes, e.g. a
    /// `(&'static str, &'static str)` operation/parent-type pair or a dedicated enum.
    ///
    /// Fails with [`LoadError::LoaderMismatch`] when the identity is already bound to a loader of
    /// different key, value or batch function types, and with [`LoadError::ScopeClosed`] once the
    /// scope's unit of work has ended.
    pub fn loader<I, K, V, F>(&self, identity: I, batch_fn: F) -> LoadResult<Loader<K, V, F>>
    where
        I: Eq + Hash + Debug + Send + Sync + 'static,
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: BatchFunction<K, V>,
    {
        let mut registry = self.inner.registry.lock();
        if self.inner.core.closed.load(Ordering::SeqCst) {
            return Err(LoadError::ScopeClosed);
        }

        let loaders = registry
            .by_identity
            .entry(TypeId::of::<I>())
            .or_insert_with(|| Box::new(IdentityMap::<I>::new()) as Box<dyn Any + Send + Sync>)
            .downcast_mut::<IdentityMap<I>>()
            .ok_or_else(|| LoadError::LoaderMismatch { identity: format!("{:?}", identity) })?;

        if let Some(existing) = loaders.get(&identity) {
            return Arc::clone(existing)
                .downcast::<LoaderInner<K, V, F>>()
                .map(Loader::from_inner)
                .map_err(|_| LoadError::LoaderMismatch { identity: format!("{:?}", identity) });
        }

        let name = format!("{:?}", identity);
        tracing::debug!(scope = self.inner.core.id, loader = %name, "creating loader");
        let inner = Arc::new(LoaderInner::new(name, batch_fn, Arc::clone(&self.inner.core)));
        loaders.insert(identity, Arc::clone(&inner) as Arc<dyn Any + Send + Sync>);
        registry.batches.push(Arc::clone(&inner) as ReadyBatch);
        Ok(Loader::from_inner(inner))
    }

    /// Cancels the scope's outstanding work.
    ///
    /// An in-flight batch function call is dropped, loaders waiting in the ready queue are not
    /// fetched, and all of their deferreds fail with [`LoadError::Cancelled`], as do loads issued
    /// afterwards. Already completed values are unaffected. [`run`](crate::run) still returns once
    /// the caller's logic finishes.
    pub fn cancel(&self) {
        let core = &self.inner.core;
        if !core.cancelled.swap(true, Ordering::SeqCst) {
            tracing::debug!(scope = core.id, "scope cancelled");
            core.cancel_notify.notify_waiters();
        }
    }

    /// Returns true once [`Scope::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.core.is_cancelled()
    }

    /// Returns true once the unit of work that owns this scope has ended.
    pub fn is_closed(&self) -> bool {
        self.inner.core.closed.load(Ordering::SeqCst)
    }

    /// A snapshot of the scope's counters.
    pub fn stats(&self) -> ScopeStats {
        self.inner.core.stats.lock().clone()
    }

    /// Process-unique scope number, as recorded in tracing output.
    pub fn id(&self) -> u64 {
        self.inner.core.id
    }

    /// The configuration the scope was created with.
    pub fn config(&self) -> &ScopeConfig {
        &self.inner.core.config
    }

    /// Returns true if both handles refer to the same scope.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Marks the scope closed and fails every key that is still waiting for a batch. Loader
    /// windows are taken under their own lock after the flag is set, so a concurrent `load`
    /// either sees the flag or has its key failed here.
    pub(crate) fn close(&self) {
        let core = &self.inner.core;
        core.closed.store(true, Ordering::SeqCst);
        let registry = std::mem::take(&mut *self.inner.registry.lock());
        for batch in registry.batches {
            let abandoned = batch.abandon(LoadError::ScopeClosed);
            if abandoned > 0 {
                tracing::warn!(
                    scope = core.id,
                    loader = batch.identity(),
                    abandoned,
                    "keys were still pending when the scope closed"
                );
            }
        }
        tracing::debug!(scope = core.id, "scope closed");
    }

    /// Runs `fut` with this scope as the current scope. See [`Scope::current`].
    pub fn enter<Fut: Future>(&self, fut: Fut) -> impl Future<Output = Fut::Output> {
        crate::context::enter(self.clone(), fut)
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.core.id)
            .field("name", &self.inner.core.config.name)
            .field("closed", &self.is_closed())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
