use std::future::Future;

use futures::future;
use tokio::sync::watch;
use tracing_futures::Instrument;

use crate::{config::ScopeConfig, scope::Scope};

/// Runs one unit of work in a fresh [`Scope`] with the default configuration.
///
/// See [`run_with`].
pub async fn run<F, Fut, T>(logic: F) -> T
where
    F: FnOnce(Scope) -> Fut,
    Fut: Future<Output = T>,
{
    run_with(ScopeConfig::default(), logic).await
}

/// Runs one unit of work in a fresh [`Scope`].
///
/// `logic` receives the scope and runs with it as the current scope (see [`Scope::current`]).
/// The scope's drain loop runs alongside it on the same task, executing loader batches one at a
/// time, and this function returns only once the logic has produced its output and no loader has
/// keys waiting. The scope is closed before returning: its loaders and their caches must not be
/// used afterwards, and any load issued on them fails with
/// [`LoadError::ScopeClosed`](crate::LoadError::ScopeClosed).
///
/// Calls may be nested. An inner `run` owns an entirely separate scope that is drained before the
/// inner call returns; nothing it loads is visible to the outer scope.
pub async fn run_with<F, Fut, T>(config: ScopeConfig, logic: F) -> T
where
    F: FnOnce(Scope) -> Fut,
    Fut: Future<Output = T>,
{
    let (scope, worker) = Scope::new(config);
    let span = tracing::debug_span!(
        "scope",
        id = scope.id(),
        name = scope.config().name.as_deref().unwrap_or_default()
    );

    let (done_tx, done_rx) = watch::channel(false);
    let logic_scope = scope.clone();
    let driven = async move {
        let logic = async move {
            let output = logic(logic_scope).await;
            // The drain loop may exit as soon as it sees the queue empty after this.
            let _ = done_tx.send(true);
            output
        };
        // `join` polls the logic before the drain loop on every wake-up, so continuations woken by
        // a batch always get to register their keys before the next batch fires.
        let (output, ()) = future::join(logic, worker.drain(done_rx)).await;
        output
    };

    // Closes the scope on return, and also when the caller drops this future midway.
    let _close = CloseOnDrop(scope.clone());
    scope.enter(driven).instrument(span).await
}

struct CloseOnDrop(Scope);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}
