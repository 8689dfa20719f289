//! Deferred ingestion requests.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::QueueConfig;

/// Path a redelivering queue targets on the HTTP surface.
pub const REDELIVERY_PATH: &str = "/servingURLExternal";

/// Identifier assigned to a task on submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Retry budget attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Attempts allowed after the first delivery
    pub retry_limit: u32,
    /// Minimum delay between attempts
    pub min_backoff: Duration,
}

impl RetryOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            retry_limit: config.retry_limit,
            min_backoff: config.min_backoff(),
        }
    }

    /// Total deliveries the task may receive.
    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retry_limit: 2,
            min_backoff: Duration::from_secs(2),
        }
    }
}

/// An ingestion request waiting for (re)delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestTask {
    pub id: TaskId,
    pub resource_id: String,
    pub source_url: String,
    pub retry: RetryOptions,
    /// Endpoint a remote queue would call back
    pub target: String,
    pub created_at: DateTime<Utc>,
}

impl IngestTask {
    pub fn new(resource_id: impl Into<String>, source_url: impl Into<String>, retry: RetryOptions) -> Self {
        Self {
            id: TaskId::new(),
            resource_id: resource_id.into(),
            source_url: source_url.into(),
            retry,
            target: REDELIVERY_PATH.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A task whose retry budget ran out.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub task: IngestTask,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_budget() {
        let retry = RetryOptions::default();
        assert_eq!(retry.retry_limit, 2);
        assert_eq!(retry.max_attempts(), 3);
        assert_eq!(retry.min_backoff, Duration::from_secs(2));
        assert_eq!(RetryOptions::from_config(&QueueConfig::default()), retry);
    }

    #[test]
    fn test_new_task_targets_redelivery_path() {
        let task = IngestTask::new("42", "https://example.test/img.jpg", RetryOptions::default());
        assert_eq!(task.target, REDELIVERY_PATH);
        assert_ne!(task.id, IngestTask::new("42", "x", RetryOptions::default()).id);
    }
}
