use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{Notify, OnceCell};

use crate::error::{LoadError, LoadResult};

/// A single-assignment value that any number of tasks may wait on.
///
/// A `Deferred` is handed out by [`Loader::load`](crate::Loader::load) before the value exists.
/// The loader completes it exactly once, when the batch containing its key has been fetched, and
/// every clone then observes the same outcome. Clones share the same cell, so two loads of one key
/// in the same scope return deferreds for which [`Deferred::ptr_eq`] holds.
///
/// A `Deferred` can be awaited directly (it implements [`IntoFuture`]), or inspected through
/// [`Deferred::get`] and [`Deferred::peek`] without consuming it.
pub struct Deferred<T> {
    cell: Arc<Cell<T>>,
}

struct Cell<T> {
    outcome: OnceCell<LoadResult<T>>,
    completed: Notify,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self { cell: Arc::clone(&self.cell) }
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deferred<T> {
    /// Creates an unresolved cell.
    pub fn new() -> Self {
        Self { cell: Arc::new(Cell { outcome: OnceCell::new(), completed: Notify::new() }) }
    }

    /// Creates a cell that already holds `value`.
    pub fn resolved(value: T) -> Self {
        Self::completed(Ok(value))
    }

    /// Creates a cell that already holds `error`.
    pub fn failed(error: LoadError) -> Self {
        Self::completed(Err(error))
    }

    fn completed(outcome: LoadResult<T>) -> Self {
        let cell = Cell { outcome: OnceCell::new_with(Some(outcome)), completed: Notify::new() };
        Self { cell: Arc::new(cell) }
    }

    /// Completes the cell with a value and wakes every waiter.
    ///
    /// # Panics
    ///
    /// Panics if the cell was already completed.
    pub fn resolve(&self, value: T) {
        self.complete(Ok(value));
    }

    /// Completes the cell with an error and wakes every waiter.
    ///
    /// # Panics
    ///
    /// Panics if the cell was already completed.
    pub fn fail(&self, error: LoadError) {
        self.complete(Err(error));
    }

    fn complete(&self, outcome: LoadResult<T>) {
        if self.cell.outcome.set(outcome).is_err() {
            panic!("deferred value completed twice");
        }
        self.cell.completed.notify_waiters();
    }

    /// Returns true once the cell holds a value or an error.
    pub fn is_completed(&self) -> bool {
        self.cell.outcome.initialized()
    }

    /// Returns true if both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Clone> Deferred<T> {
    /// Returns the outcome if the cell has been completed, without waiting.
    pub fn peek(&self) -> Option<LoadResult<T>> {
        self.cell.outcome.get().cloned()
    }

    /// Waits for the cell to be completed and returns a copy of its outcome.
    pub async fn get(&self) -> LoadResult<T> {
        loop {
            // Register before checking so a completion between the check and the await is not
            // missed.
            let completed = self.cell.completed.notified();
            if let Some(outcome) = self.cell.outcome.get() {
                return outcome.clone();
            }
            completed.await;
        }
    }
}

impl<T> IntoFuture for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = LoadResult<T>;
    type IntoFuture = BoxFuture<'static, LoadResult<T>>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.get().await }.boxed()
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").field("outcome", &self.cell.outcome.get()).finish()
    }
}
