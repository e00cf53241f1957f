//! Registry for turns that outlive their HTTP request.
//!
//! Every turn runs as a spawned task so it can finish (and commit history)
//! after the client goes away. Shutdown waits for these tasks.

// std::sync::Mutex is fine: never held across an await.
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn a task and track it until it finishes.
    pub fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);

        let mut handles = self.handles();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait for every tracked task to complete.
    pub async fn shutdown(&self) {
        let handles = std::mem::take(&mut *self.handles());
        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "waiting for in-flight turns");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "turn task panicked");
            }
        }
    }

    /// Number of tasks still running.
    pub fn pending_count(&self) -> usize {
        let mut handles = self.handles();
        handles.retain(|h| !h.is_finished());
        handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_waits_for_all_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks = BackgroundTasks::new();

        for delay in [10, 20] {
            let counter = counter.clone();
            tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tasks.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(tasks.pending_count(), 0);
    }

    #[tokio::test]
    async fn panicking_task_does_not_poison_shutdown() {
        let tasks = BackgroundTasks::new();
        tasks.spawn(async { panic!("boom") });
        tasks.shutdown().await;
    }
}
