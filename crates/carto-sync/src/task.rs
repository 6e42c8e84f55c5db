//! Plumbing shared by the watcher and bridge tasks.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{SyncError, SyncResult};

pub(crate) enum Control {
    Flush(oneshot::Sender<SyncResult<usize>>),
    Stop,
}

/// A running sync task and its control channel.
pub(crate) struct TaskHandle {
    pub(crate) control: mpsc::Sender<Control>,
    pub(crate) task: JoinHandle<()>,
}

impl TaskHandle {
    /// Stop the task and wait until it has exited.
    pub(crate) async fn stop(self) -> SyncResult<()> {
        // A closed channel means the task already exited.
        let _ = self.control.send(Control::Stop).await;
        self.task
            .await
            .map_err(|e| SyncError::TaskFailed(e.to_string()))
    }
}

pub(crate) async fn request_flush(control: &mpsc::Sender<Control>) -> SyncResult<usize> {
    let (reply, response) = oneshot::channel();
    control
        .send(Control::Flush(reply))
        .await
        .map_err(|_| SyncError::TaskFailed("sync task is gone".into()))?;
    response
        .await
        .map_err(|_| SyncError::TaskFailed("sync task dropped the flush".into()))?
}

/// Sleep until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
