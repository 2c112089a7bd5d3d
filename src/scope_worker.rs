use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::{batch::ReadyBatch, scope::ScopeCore};

/// A `ScopeWorker` runs a scope's drain loop. It is the only consumer of the scope's ready queue,
/// so exactly one drain loop exists per scope and batches never run concurrently within it.
///
/// The worker runs next to the caller's logic, on the same task, until the scope is quiescent:
/// the logic has finished and the ready queue is empty. Each cycle through the loop may be called
/// an "execution frame":
///
/// 1. Waiting. If the queue is empty and the logic is still running, the worker idles until a
///    loader is queued or the logic finishes.
/// 2. Settling. After dequeuing a loader, the worker yields `yield_count` times. Continuations
///    woken by the previous batch run during these yields and may add keys to this loader's
///    window, or queue other loaders behind it.
/// 3. Executing. The worker fires the loader's batch and waits for it to complete before
///    dequeuing the next loader. Loaders queued as a side effect of the batch's results are picked
///    up by the following frames, which is what lets recursive traversals converge without knowing
///    their depth.
///
/// A failed batch only fails its own keys; the loop carries on with the next loader. Once the
/// scope is cancelled, dequeued loaders are abandoned instead of executed.
pub(crate) struct ScopeWorker {
    core: Arc<ScopeCore>,
    ready_rx: mpsc::UnboundedReceiver<ReadyBatch>,
}

impl ScopeWorker {
    pub(crate) fn new(core: Arc<ScopeCore>, ready_rx: mpsc::UnboundedReceiver<ReadyBatch>) -> Self {
        Self { core, ready_rx }
    }

    /// Drains the ready queue until it is empty and `logic_done` reports that the caller's logic
    /// has finished.
    pub(crate) async fn drain(mut self, mut logic_done: watch::Receiver<bool>) {
        loop {
            let batch = match self.ready_rx.try_recv() {
                Ok(batch) => batch,
                Err(mpsc::error::TryRecvError::Disconnected) => return,
                Err(mpsc::error::TryRecvError::Empty) => {
                    if *logic_done.borrow() {
                        tracing::debug!(scope = self.core.id, "scope drained");
                        return;
                    }
                    // Wait for the next loader, or for the logic to finish.
                    tokio::select! {
                        received = self.ready_rx.recv() => match received {
                            Some(batch) => batch,
                            None => return,
                        },
                        changed = logic_done.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            continue;
                        }
                    }
                }
            };

            for _ in 0..self.core.config.yield_count {
                tokio::task::yield_now().await;
            }

            if let Some(error) = self.core.rejection() {
                let abandoned = batch.abandon(error);
                tracing::debug!(
                    scope = self.core.id,
                    loader = batch.identity(),
                    abandoned,
                    "batch abandoned"
                );
                continue;
            }
            self.fire(batch).await;
        }
    }

    #[tracing::instrument(skip_all, fields(scope = self.core.id, loader = batch.identity()))]
    async fn fire(&self, batch: ReadyBatch) {
        batch.execute().await;
    }
}
