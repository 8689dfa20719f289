//! Retry dispatcher.
//!
//! External requests are only ever enqueued; the queue later calls back with
//! a [`RedeliveryMarker`] and only then does ingestion run synchronously.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{IngestTask, RetryOptions, TaskId};
use crate::pipeline::IngestionPipeline;
use crate::queue::{RedeliveryMarker, TaskHandler, TaskQueue};

/// How a dispatch request arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// First contact from an outside caller
    External,
    /// Delivered by the retrying queue
    Redelivery(RedeliveryMarker),
}

/// Result of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Accepted for background ingestion
    Scheduled { task_id: TaskId },
    /// Ingested synchronously
    Completed { serving_url: String },
}

pub struct Dispatcher {
    ingest: Arc<IngestionPipeline>,
    queue: Arc<dyn TaskQueue>,
    retry: RetryOptions,
}

impl Dispatcher {
    pub fn new(ingest: Arc<IngestionPipeline>, queue: Arc<dyn TaskQueue>, retry: RetryOptions) -> Self {
        Self { ingest, queue, retry }
    }

    pub async fn dispatch(
        &self,
        resource_id: &str,
        source: &str,
        delivery: Delivery,
    ) -> Result<DispatchOutcome> {
        match delivery {
            Delivery::External => self.enqueue(resource_id, source).await,
            Delivery::Redelivery(marker) => {
                debug!(resource_id, attempt = marker.attempt(), "running redelivered ingestion");
                let serving_url = self.ingest.ingest(resource_id, source).await?;
                Ok(DispatchOutcome::Completed { serving_url })
            }
        }
    }

    async fn enqueue(&self, resource_id: &str, source: &str) -> Result<DispatchOutcome> {
        // Refuse bad input now rather than burning the retry budget on it.
        let (id, source) = self.ingest.classify(resource_id, source)?;

        let task = IngestTask::new(id.as_str(), source.to_string(), self.retry);
        let task_id = self.queue.submit(task).await.map_err(|e| match e {
            AppError::EnqueueFailed { .. } => e,
            other => AppError::enqueue(&id, other),
        })?;

        info!(resource_id = %id, task_id = %task_id, "Scheduled ingestion");
        Ok(DispatchOutcome::Scheduled { task_id })
    }
}

#[async_trait]
impl TaskHandler for Dispatcher {
    async fn handle(&self, task: &IngestTask, marker: RedeliveryMarker) -> Result<()> {
        self.dispatch(&task.resource_id, &task.source_url, Delivery::Redelivery(marker))
            .await
            .map(|_| ())
    }
}
