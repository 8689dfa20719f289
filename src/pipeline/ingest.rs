// src/pipeline/ingest.rs

//! Image ingestion pipeline.
//!
//! Steps run in strict order and each depends on the previous one:
//!
//! 1. derive the storage key from the resource id
//! 2. fetch the source bytes (external sources only)
//! 3. store them under the key with the source URL as provenance
//! 4. mint a serving handle for the key
//! 5. write the serving URL and key back to the resource's record
//!
//! Nothing is rolled back on failure. Every step overwrites, so calling
//! `ingest` again converges on the same end state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{
    AppConfig, IngestedImage, ResourceId, ServedLink, ServingOptions, SourcePolicy, SourceRef,
    StorageKey,
};
use crate::pipeline::{Adapters, KeyLocks, with_deadline};

/// Drives one ingestion through fetch, store, mint and record.
pub struct IngestionPipeline {
    adapters: Adapters,
    root: String,
    options: ServingOptions,
    source_policy: SourcePolicy,
    deadline: Duration,
    locks: Option<Arc<KeyLocks>>,
}

impl IngestionPipeline {
    pub fn new(adapters: Adapters, config: &AppConfig) -> Self {
        Self {
            adapters,
            root: config.storage.root.clone(),
            options: ServingOptions {
                size: config.serving.size,
                secure: config.serving.secure,
            },
            source_policy: config.pipeline.source_policy,
            deadline: config.pipeline.deadline(),
            locks: None,
        }
    }

    /// Serialize ingestions of the same resource through `locks`.
    pub fn with_locks(mut self, locks: Arc<KeyLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Validate a request without running any step.
    pub fn classify(&self, resource_id: &str, source: &str) -> Result<(ResourceId, SourceRef)> {
        let id = ResourceId::parse(resource_id)?;
        let source = SourceRef::classify(source, &id, &self.root, self.source_policy)?;
        Ok((id, source))
    }

    /// Ingest the image at `source` for `resource_id` and return its serving URL.
    ///
    /// `source` is either an http(s) URL to fetch or the resource's own storage
    /// key, in which case only the handle is re-minted and recorded.
    #[instrument(skip_all, fields(resource_id = %resource_id, source = %source))]
    pub async fn ingest(&self, resource_id: &str, source: &str) -> Result<String> {
        let (id, source) = self.classify(resource_id, source)?;
        with_deadline("ingest", self.deadline, self.run(&id, &source)).await
    }

    async fn run(&self, id: &ResourceId, source: &SourceRef) -> Result<String> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock(id).await),
            None => None,
        };

        let key = StorageKey::derive(&self.root, id);
        debug!(key = %key, "derived storage key");

        match source {
            SourceRef::External(url) => self.fetch_and_store(url, &key).await?,
            SourceRef::Stored(_) => self.ensure_resident(&key).await?,
        }

        let serving_url = self
            .adapters
            .handles
            .mint(&key, &self.options)
            .await
            .map_err(|e| AppError::handle_creation(&key, e))?;
        debug!(key = %key, "minted serving URL");

        self.adapters
            .records
            .update_link(id, &ServedLink::new(&serving_url, &key))
            .await
            .map_err(|e| AppError::record_update(id, e))?;

        info!(key = %key, refetched = source.is_external(), "Ingested image");
        Ok(serving_url)
    }

    async fn fetch_and_store(&self, url: &Url, key: &StorageKey) -> Result<()> {
        let fetched = self
            .adapters
            .fetcher
            .fetch(url.as_str(), key.as_str())
            .await
            .map_err(|e| match e {
                AppError::FetchFailed { .. }
                | AppError::UnsupportedContentType { .. }
                | AppError::Validation(_) => e,
                other => AppError::fetch(url.as_str(), other),
            })?;
        debug!(
            key = %key,
            bytes = fetched.bytes.len(),
            content_type = fetched.content_type.as_deref().unwrap_or("-"),
            "fetched source"
        );

        let image = IngestedImage::new(url, key.clone(), fetched);
        self.adapters
            .objects
            .put(key, &image.to_stored_object())
            .await
            .map_err(|e| AppError::persist(key, e))?;
        debug!(key = %key, "stored object");
        Ok(())
    }

    /// Skip-fetch mode needs the object already in place.
    async fn ensure_resident(&self, key: &StorageKey) -> Result<()> {
        let exists = self
            .adapters
            .objects
            .exists(key)
            .await
            .map_err(|e| AppError::handle_creation(key, e))?;
        if !exists {
            return Err(AppError::missing_object(key));
        }
        Ok(())
    }
}
