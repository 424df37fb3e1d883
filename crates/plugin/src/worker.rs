//! Worker group
//!
//! The shutdown barrier shared by all plugin workers. The supervisor
//! keeps one group per stop phase, closes it once every worker is
//! spawned, and waits for it bounded by the hard-kill timeout.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// Tracks a set of plugin workers for coordinated shutdown
///
/// Cloning hands plugins a way to register the I/O tasks they spawn;
/// all clones share the same barrier.
#[derive(Clone, Default)]
pub struct WorkerGroup {
    tracker: TaskTracker,
}

impl WorkerGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a worker tracked by this group
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(future)
    }

    /// Stop accepting new workers
    ///
    /// Must be called before `wait`, which would otherwise never
    /// resolve on an open group.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Wait until every tracked worker has finished
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Number of workers still running
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Whether no workers are running
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }
}

impl std::fmt::Debug for WorkerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerGroup")
            .field("running", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_joins_all_workers() {
        let group = WorkerGroup::new();
        let done = Arc::new(AtomicU64::new(0));

        for _ in 0..4 {
            let done = Arc::clone(&done);
            group.spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        group.close();
        group.wait().await;
        assert_eq!(done.load(Ordering::SeqCst), 4);
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_barrier() {
        let group = WorkerGroup::new();
        let clone = group.clone();

        clone.spawn(async {});
        group.close();
        group.wait().await;
        assert!(clone.is_empty());
    }
}
