// src/queue/mod.rs

//! At-least-once delivery of deferred ingestion tasks.
//!
//! A task submitted here is delivered to a [`TaskHandler`] together with a
//! [`RedeliveryMarker`]. The marker is the only way to ask the dispatcher for
//! synchronous execution, and outside this crate it can only be obtained by
//! presenting the shared redelivery token.

mod memory;
mod retry;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{IngestTask, QueueConfig, TaskId};

pub use memory::{DeadLetterLog, InMemoryTaskQueue, QueueWorker, WorkerHandle};
pub use retry::RetryPolicy;

/// Proof that a call is a redelivery by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryMarker {
    attempt: u32,
}

impl RedeliveryMarker {
    pub(crate) fn new(attempt: u32) -> Self {
        Self { attempt }
    }

    /// Check a token presented by a remote queue.
    ///
    /// Returns `None` when the token is missing, wrong, or no token is
    /// configured.
    pub fn verify(presented: Option<&str>, config: &QueueConfig) -> Option<Self> {
        let expected = config.redelivery_token.as_bytes();
        let presented = presented?.trim().as_bytes();
        if expected.is_empty() || !constant_time_eq(presented, expected) {
            return None;
        }
        Some(Self::new(1))
    }

    /// 1-based delivery attempt this marker was issued for.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Accepts tasks for later delivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Submit a task. Fails with `EnqueueFailed` if the queue refuses it.
    async fn submit(&self, task: IngestTask) -> Result<TaskId>;
}

/// Receives delivered tasks.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &IngestTask, marker: RedeliveryMarker) -> Result<()>;
}
