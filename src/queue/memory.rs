//! In-process delivery queue.
//!
//! `InMemoryTaskQueue` is the submitting half of a bounded channel and
//! `QueueWorker` the receiving half. The worker delivers every task on its own
//! tokio task, so a slow source host for one resource does not hold up the
//! others, and retries failed deliveries with exponential backoff.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::models::{DeadLetter, IngestTask, QueueConfig, TaskId};
use crate::queue::{RedeliveryMarker, RetryPolicy, TaskHandler, TaskQueue};

/// Tasks whose retry budget ran out.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterLog(Arc<Mutex<Vec<DeadLetter>>>);

impl DeadLetterLog {
    fn push(&self, letter: DeadLetter) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(letter);
    }

    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Submitting side of the in-process queue.
#[derive(Debug, Clone)]
pub struct InMemoryTaskQueue {
    sender: mpsc::Sender<IngestTask>,
}

impl InMemoryTaskQueue {
    /// Create a queue holding at most `capacity` undelivered tasks.
    pub fn channel(capacity: usize, policy: RetryPolicy) -> (Self, QueueWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = QueueWorker {
            receiver,
            policy,
            dead_letters: DeadLetterLog::default(),
        };
        (Self { sender }, worker)
    }

    pub fn from_config(config: &QueueConfig) -> (Self, QueueWorker) {
        Self::channel(config.capacity, RetryPolicy::from_config(config))
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn submit(&self, task: IngestTask) -> Result<TaskId> {
        let id = task.id;
        let resource_id = task.resource_id.clone();

        self.sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AppError::enqueue(&resource_id, "queue is full"),
            mpsc::error::TrySendError::Closed(_) => {
                AppError::enqueue(&resource_id, "queue is closed")
            }
        })?;

        debug!(task_id = %id, resource_id = %resource_id, "enqueued ingestion task");
        Ok(id)
    }
}

/// Receiving side of the in-process queue.
pub struct QueueWorker {
    receiver: mpsc::Receiver<IngestTask>,
    policy: RetryPolicy,
    dead_letters: DeadLetterLog,
}

impl QueueWorker {
    pub fn dead_letters(&self) -> DeadLetterLog {
        self.dead_letters.clone()
    }

    /// Run the worker on the current runtime until shut down.
    pub fn spawn(self, handler: Arc<dyn TaskHandler>) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let dead_letters = self.dead_letters.clone();
        let join = tokio::spawn(self.run(handler, shutdown_rx));
        WorkerHandle {
            shutdown: shutdown_tx,
            join,
            dead_letters,
        }
    }

    /// Deliver tasks until `shutdown` fires or every queue handle is dropped,
    /// then wait for deliveries already in flight.
    pub async fn run(mut self, handler: Arc<dyn TaskHandler>, mut shutdown: oneshot::Receiver<()>) {
        let mut in_flight = JoinSet::new();
        info!("Queue worker started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                next = self.receiver.recv() => match next {
                    Some(task) => {
                        in_flight.spawn(deliver(
                            task,
                            handler.clone(),
                            self.policy.clone(),
                            self.dead_letters.clone(),
                        ));
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Delivery task aborted: {}", e);
                    }
                }
            }
        }

        self.receiver.close();
        let mut dropped = 0usize;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!("Queue worker stopping with {} undelivered tasks", dropped);
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Delivery task aborted: {}", e);
            }
        }
        info!("Queue worker stopped");
    }
}

/// A running worker.
pub struct WorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
    dead_letters: DeadLetterLog,
}

impl WorkerHandle {
    pub fn dead_letters(&self) -> DeadLetterLog {
        self.dead_letters.clone()
    }

    /// Stop taking new tasks and wait for in-flight deliveries.
    pub async fn shutdown(self) {
        // The worker may already have exited on its own.
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            error!("Queue worker panicked: {}", e);
        }
    }

    /// Wait for the worker to exit once every queue handle is dropped.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!("Queue worker panicked: {}", e);
        }
    }
}

/// Deliver one task, retrying within its budget.
async fn deliver(
    task: IngestTask,
    handler: Arc<dyn TaskHandler>,
    policy: RetryPolicy,
    dead_letters: DeadLetterLog,
) {
    let policy = policy.with_base(task.retry.min_backoff);
    let max_attempts = task.retry.max_attempts();
    let mut attempt = 1;

    loop {
        let err = match handler.handle(&task, RedeliveryMarker::new(attempt)).await {
            Ok(()) => {
                debug!(task_id = %task.id, resource_id = %task.resource_id, attempt, "delivered");
                return;
            }
            Err(err) => err,
        };

        // Bad input fails the same way every time.
        if attempt >= max_attempts || err.is_validation() {
            error!(
                task_id = %task.id,
                resource_id = %task.resource_id,
                attempts = attempt,
                "Ingestion task failed permanently: {}",
                err
            );
            dead_letters.push(DeadLetter {
                task,
                attempts: attempt,
                last_error: err.to_string(),
                failed_at: Utc::now(),
            });
            return;
        }

        let delay = policy.next_delay(attempt);
        warn!(
            task_id = %task.id,
            resource_id = %task.resource_id,
            attempt,
            "Delivery failed, retrying in {:?}: {}",
            delay,
            err
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
