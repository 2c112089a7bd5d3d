//! Discovery of the current scope for code that does not receive it as a parameter.
//!
//! The preferred way to reach a scope is to pass it down explicitly, e.g. inside the per-request
//! context a resolver framework threads through field resolution. For call sites that cannot take
//! it as a parameter, the scope is also stored in a tokio task-local while [`run`](crate::run)
//! drives the caller's logic.
//!
//! What the task-local reaches, precisely:
//!
//! * every `.await` and every future polled by the same task inside `run`, including futures
//!   combined with `join!`, `select!`, `join_all` and the like;
//! * a nested `run` shadows it with the inner scope until the inner `run` returns, then the outer
//!   scope is current again.
//!
//! What it does not reach: futures handed to `tokio::spawn`, `spawn_blocking` or any other
//! executor, and plain OS threads. Use [`Scope::spawn`] or [`Scope::enter`] to carry the scope
//! into such a future explicitly. Independently started units of work never observe each other's
//! scope.

use std::future::Future;

use crate::scope::Scope;

tokio::task_local! {
    static CURRENT_SCOPE: Scope;
}

pub(crate) fn enter<Fut: Future>(scope: Scope, fut: Fut) -> impl Future<Output = Fut::Output> {
    CURRENT_SCOPE.scope(scope, fut)
}

impl Scope {
    /// Returns the scope whose unit of work is running on the current task, if any.
    pub fn current() -> Option<Scope> {
        CURRENT_SCOPE.try_with(Scope::clone).ok()
    }

    /// Spawns `fut` on the tokio runtime with this scope as its current scope.
    ///
    /// The scope does not wait for the spawned task; loads it issues are drained as long as the
    /// scope's unit of work is still running, and fail with
    /// [`LoadError::ScopeClosed`](crate::LoadError::ScopeClosed) afterwards.
    pub fn spawn<Fut>(&self, fut: Fut) -> tokio::task::JoinHandle<Fut::Output>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        tokio::spawn(self.enter(fut))
    }
}
