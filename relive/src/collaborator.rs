//! Owned background collaborator tasks.
//!
//! A stream may have one long-running collaborator attached (e.g. a live
//! transcription feeding an external service). The supervisor owns the
//! task's lifetime only: cancellation is cooperative and bounded, and the
//! task's outcome is discarded because the owning stream operation must
//! complete either way.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// A cancellable background task owned by a stream record.
#[derive(Debug)]
pub struct CollaboratorTask {
    id: Uuid,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl CollaboratorTask {
    /// Spawn a collaborator. The closure receives the cancellation token it
    /// must observe to stop cooperatively.
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task = tokio::spawn(f(token.clone()));
        Self {
            id: Uuid::new_v4(),
            token,
            task,
        }
    }

    /// Identifier callers may hold as a weak reference to this task.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request cancellation and wait up to `wait` for the task to settle.
    /// Timeouts, panics, and cancellation outcomes are all swallowed.
    pub async fn cancel(self, wait: Duration) {
        self.token.cancel();
        match tokio::time::timeout(wait, self.task).await {
            Ok(Ok(())) => debug!(task_id = %self.id, "Collaborator task settled"),
            Ok(Err(join_err)) => {
                debug!(task_id = %self.id, error = %join_err, "Collaborator task ended abnormally")
            }
            Err(_) => {
                debug!(task_id = %self.id, "Collaborator task did not settle within the wait window")
            }
        }
    }
}
