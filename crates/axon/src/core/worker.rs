use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Owns the completion worker task.
///
/// `shutdown` cancels the shared token and awaits the join, so the
/// caller knows the worker released everything it held. Dropping the
/// handle without shutting down cancels the token and detaches a
/// reaper for the task.
pub(crate) struct WorkerHandle {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn new<F>(cancel: CancellationToken, spawn: F) -> Self
    where
        F: FnOnce() -> JoinHandle<()>,
    {
        Self {
            cancel,
            handle: Some(spawn()),
        }
    }

    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                error!(%err, "completion worker terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if Handle::try_current().is_ok() {
                tokio::spawn(async move {
                    let _ = handle.await;
                });
            }
        }
    }
}
