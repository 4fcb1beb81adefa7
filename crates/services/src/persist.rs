use std::sync::Arc;

use storage::repository::SessionStateRepository;
use tokio::task::JoinHandle;

use crate::Clock;
use crate::handle::AttemptHandle;

/// Writes a fresh snapshot after every revision of the attempt.
///
/// Storage failures are logged and skipped; losing a snapshot must never
/// interrupt the attempt itself.
pub struct SnapshotPersister;

impl SnapshotPersister {
    /// Start persisting `handle`. Returns `None` when no runtime is available.
    #[must_use]
    pub fn start(
        handle: &AttemptHandle,
        repo: Arc<dyn SessionStateRepository>,
        clock: Clock,
    ) -> Option<PersistGuard> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!(error = %err, "snapshot persistence unavailable");
                return None;
            }
        };
        let task = runtime.spawn(run(handle.clone(), repo, clock));
        Some(PersistGuard { task: Some(task) })
    }

    /// Save the current state once.
    pub async fn save_now(
        handle: &AttemptHandle,
        repo: &dyn SessionStateRepository,
        clock: Clock,
    ) -> bool {
        let snapshot = handle.snapshot();
        match repo.save_snapshot(&snapshot, clock.now()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist attempt snapshot");
                false
            }
        }
    }
}

async fn run(handle: AttemptHandle, repo: Arc<dyn SessionStateRepository>, clock: Clock) {
    let mut changes = handle.subscribe();
    SnapshotPersister::save_now(&handle, repo.as_ref(), clock).await;
    while changes.changed().await.is_ok() {
        // Revisions that arrived during the save collapse into the next one.
        changes.borrow_and_update();
        SnapshotPersister::save_now(&handle, repo.as_ref(), clock).await;
    }
}

/// Cancels the persister when dropped.
#[derive(Debug)]
pub struct PersistGuard {
    task: Option<JoinHandle<()>>,
}

impl PersistGuard {
    /// Cancel and wait until no save is in flight.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            match task.await {
                Err(err) if !err.is_cancelled() => {
                    tracing::warn!(error = %err, "snapshot persister failed");
                }
                _ => {}
            }
        }
    }
}

impl Drop for PersistGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
