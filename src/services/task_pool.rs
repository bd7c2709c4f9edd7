use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Bounded pool for detached work that must not hold up a reply.
///
/// Each task runs under its own deadline and at most `limit` tasks run at
/// once; the rest wait for a permit. `shutdown` stops accepting new work,
/// abandons tasks still waiting for a permit and waits for the running ones.
#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    active: Arc<watch::Sender<usize>>,
}

/// Counts a task as in flight until its future is dropped.
struct ActiveGuard(Arc<watch::Sender<usize>>);

impl ActiveGuard {
    fn enter(active: &Arc<watch::Sender<usize>>) -> Self {
        active.send_modify(|n| *n += 1);
        ActiveGuard(active.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl BackgroundTasks {
    pub fn new(limit: usize) -> Self {
        BackgroundTasks {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(limit.max(1))),
            shutdown: CancellationToken::new(),
            active: Arc::new(watch::channel(0).0),
        }
    }

    /// Returns false when the pool is already shutting down.
    pub fn spawn<F>(&self, name: &'static str, deadline: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            tracing::warn!(task = name, "Background pool closed, dropping task");
            return false;
        }

        let permits = self.permits.clone();
        let shutdown = self.shutdown.clone();
        let active = ActiveGuard::enter(&self.active);
        self.tracker.spawn(async move {
            let _active = active;
            let _permit = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => return,
                },
                _ = shutdown.cancelled() => {
                    tracing::warn!(task = name, "Shutdown before task started");
                    return;
                }
            };

            if tokio::time::timeout(deadline, task).await.is_err() {
                tracing::warn!(
                    task = name,
                    deadline_ms = deadline.as_millis() as u64,
                    "Background task exceeded its deadline"
                );
            }
        });
        true
    }

    /// Number of tasks spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until no task is in flight, without closing the pool.
    pub async fn settle(&self) {
        let mut idle = self.active.subscribe();
        let _ = idle.wait_for(|n| *n == 0).await;
    }

    pub async fn shutdown(&self) {
        self.tracker.close();
        self.shutdown.cancel();
        self.tracker.wait().await;
        tracing::info!("Background tasks drained");
    }
}
