//! Detached background work (cache refreshes).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Tracks detached tasks so the host can wait for them before teardown.
///
/// The response path only spawns; it never awaits what it spawned.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    set: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set.lock().await;
        while let Some(done) = set.try_join_next() {
            if let Err(e) = done {
                tracing::warn!(error = %e, "background task panicked");
            }
        }
        set.spawn(task);
    }

    /// Number of spawned tasks not yet reaped.
    pub async fn pending(&self) -> usize {
        self.set.lock().await.len()
    }

    /// Wait until every task spawned so far (and any they spawn) has finished.
    pub async fn settle(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.set.lock().await);
            if set.is_empty() {
                return;
            }
            while let Some(done) = set.join_next().await {
                if let Err(e) = done {
                    tracing::warn!(error = %e, "background task panicked");
                }
            }
        }
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks").finish_non_exhaustive()
    }
}
