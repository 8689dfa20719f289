//! Pipeline entry points.
//!
//! - `IngestionPipeline::ingest`: fetch, store, mint and record an image
//! - `DeletionPipeline::delete`: revoke the handle, then delete the object
//! - `Dispatcher::dispatch`: enqueue external requests, run redeliveries

mod delete;
mod dispatch;
mod ingest;
mod locks;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::records::RecordStore;
use crate::serving::ServingHandles;
use crate::services::Fetcher;
use crate::storage::ObjectStore;

pub use delete::DeletionPipeline;
pub use dispatch::{Delivery, DispatchOutcome, Dispatcher};
pub use ingest::IngestionPipeline;
pub use locks::KeyLocks;

/// The four collaborators the pipelines drive.
#[derive(Clone)]
pub struct Adapters {
    pub fetcher: Arc<dyn Fetcher>,
    pub objects: Arc<dyn ObjectStore>,
    pub handles: Arc<dyn ServingHandles>,
    pub records: Arc<dyn RecordStore>,
}

/// Run `fut`, failing with `DeadlineExceeded` once `deadline` has passed.
///
/// Dropping the future on expiry cancels whatever I/O it was awaiting; steps
/// that already completed stay completed.
pub(crate) async fn with_deadline<T, F>(operation: &str, deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} exceeded its deadline of {:?}", operation, deadline);
            Err(AppError::DeadlineExceeded {
                operation: operation.to_string(),
                secs: deadline.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let value = with_deadline("ingest", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let err = with_deadline("delete", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::DeadlineExceeded { ref operation, .. } if operation == "delete"));
    }
}
