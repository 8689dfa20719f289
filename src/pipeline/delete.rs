//! Image deletion pipeline.
//!
//! The serving handle is revoked before the object is deleted, so a reader
//! can never hold a live handle to a missing object. The resource's record is
//! left as is.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, Result};
use crate::models::{AppConfig, ResourceId, StorageKey};
use crate::pipeline::{Adapters, KeyLocks, with_deadline};

/// Revokes and deletes the image of a resource.
pub struct DeletionPipeline {
    adapters: Adapters,
    root: String,
    deadline: Duration,
    locks: Option<Arc<KeyLocks>>,
}

impl DeletionPipeline {
    pub fn new(adapters: Adapters, config: &AppConfig) -> Self {
        Self {
            adapters,
            root: config.storage.root.clone(),
            deadline: config.pipeline.deadline(),
            locks: None,
        }
    }

    pub fn with_locks(mut self, locks: Arc<KeyLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Delete the image of `resource_id`. Deleting twice succeeds.
    #[instrument(skip_all, fields(resource_id = %resource_id))]
    pub async fn delete(&self, resource_id: &str) -> Result<()> {
        let id = ResourceId::parse(resource_id)?;
        with_deadline("delete", self.deadline, self.run(&id)).await
    }

    /// Delete several resources, at most `concurrency` at a time.
    ///
    /// Each id gets its own result; one failure does not stop the rest.
    pub async fn delete_many(
        &self,
        resource_ids: &[String],
        concurrency: usize,
    ) -> Vec<(String, Result<()>)> {
        let results: Vec<_> = stream::iter(resource_ids)
            .map(|id| async move { (id.clone(), self.delete(id).await) })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!("{} of {} deletions failed", failed, results.len());
        }
        results
    }

    async fn run(&self, id: &ResourceId) -> Result<()> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock(id).await),
            None => None,
        };

        let key = StorageKey::derive(&self.root, id);

        self.adapters
            .handles
            .revoke(&key)
            .await
            .map_err(|e| AppError::handle_revocation(&key, e))?;
        debug!(key = %key, "revoked serving handle");

        self.adapters
            .objects
            .delete(&key)
            .await
            .map_err(|e| AppError::persist_deletion(&key, e))?;

        info!(key = %key, "Deleted image");
        Ok(())
    }
}
