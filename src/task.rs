//! Minimal isolated-task abstraction used for the agent's child contexts.
//!
//! Each child (fetch worker, policy listener) runs as its own tokio task with
//! an owned [`CancellationToken`] standing in for a termination signal. The
//! supervisor keeps the explicit channel endpoints returned at spawn time, so
//! cleanup never has to discover what it was watching.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned child task plus the means to stop it and wait for it to exit.
pub struct ChildTask {
    name: &'static str,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl ChildTask {
    /// Spawns `body`, handing it a child cancellation token that `terminate`
    /// will trigger.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(body(cancel.clone()));
        tracing::info!(task = name, "child task spawned");
        Self {
            name,
            cancel,
            join: Some(join),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Token observed by the task body; cancelling it is the termination
    /// signal.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signals termination and waits for the task to exit. Idempotent: a task
    /// that already exited (or was already terminated) resolves immediately.
    /// A panicked child is logged and swallowed so cleanup always completes.
    pub async fn terminate(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                if err.is_panic() {
                    tracing::warn!(task = self.name, error = %err, "child task panicked");
                }
            }
            tracing::info!(task = self.name, "child task terminated");
        }
    }
}

impl Drop for ChildTask {
    fn drop(&mut self) {
        // Dropping a handle must not leave an orphan running.
        self.cancel.cancel();
    }
}
