//! Control loop
//!
//! Feeds store change notifications into a [`WorkQueue`] and runs a pool of
//! workers that reconcile one key each. Failed passes are re-queued with
//! per-key exponential backoff; successful passes reset it.

use crate::coordinator::ReconcileCoordinator;
use crate::queue::{Backoff, WorkQueue};
use callgate_core::ObjectKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Control loop settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// First retry delay after a failed pass
    pub backoff_base: Duration,
    /// Upper bound on the retry delay
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(300),
        }
    }
}

/// Worker pool driving a [`ReconcileCoordinator`]
pub struct Controller {
    coordinator: Arc<ReconcileCoordinator>,
    queue: Arc<WorkQueue>,
    backoff: Arc<Backoff>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(coordinator: ReconcileCoordinator, config: ControllerConfig) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            queue: Arc::new(WorkQueue::new()),
            backoff: Arc::new(Backoff::new(config.backoff_base, config.backoff_max)),
            config,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        self.queue.clone()
    }

    pub fn enqueue(&self, key: ObjectKey) {
        self.queue.add(key);
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// `initial` keys are queued before any notification is read, standing in
    /// for the initial list of a watch.
    pub async fn run(
        self,
        mut changes: broadcast::Receiver<ObjectKey>,
        initial: Vec<ObjectKey>,
        shutdown: CancellationToken,
    ) {
        let workers = self.config.workers.max(1);
        tracing::info!(workers, initial = initial.len(), "Starting controller");

        for key in initial {
            self.queue.add(key);
        }

        let mut tasks = JoinSet::new();

        let queue = self.queue.clone();
        let token = shutdown.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(key) => queue.add(key),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "Change feed lagged, some notifications were dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Change feed closed");
                            break;
                        }
                    },
                }
            }
        });

        for worker in 0..workers {
            let coordinator = self.coordinator.clone();
            let queue = self.queue.clone();
            let backoff = self.backoff.clone();
            let token = shutdown.clone();
            tasks.spawn(async move {
                loop {
                    let key = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        key = queue.next() => key,
                    };
                    process(&coordinator, &queue, &backoff, key).await;
                }
                tracing::debug!(worker, "Worker stopped");
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "Controller task panicked");
            }
        }
        tracing::info!("Controller stopped");
    }
}

async fn process(
    coordinator: &ReconcileCoordinator,
    queue: &Arc<WorkQueue>,
    backoff: &Backoff,
    key: ObjectKey,
) {
    match coordinator.reconcile(&key).await {
        Ok(_) => backoff.forget(&key),
        Err(err) => {
            let delay = backoff.next_delay(&key);
            tracing::info!(
                namespace = key.namespace(),
                name = key.name(),
                error_code = err.error_code(),
                retryable = err.is_retryable(),
                delay_ms = delay.as_millis() as u64,
                "Requeueing after failed reconcile"
            );
            queue.add_after(key.clone(), delay);
        }
    }
    queue.done(&key);
}
