//! Durable records carrying a served image link.
//!
//! The pipeline owns two fields per record: the display URL and the storage
//! location. Records themselves are created elsewhere; updating one that does
//! not exist is an error, never an implicit insert.

mod json;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{RecordsBackend, RecordsConfig, ResourceId, ServedLink};

pub use json::JsonRecordStore;
pub use memory::MemoryRecordStore;

/// Keyed record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Overwrite the link fields of an existing record.
    async fn update_link(&self, id: &ResourceId, link: &ServedLink) -> Result<()>;

    /// Read the link fields, `None` if the record does not exist.
    async fn get_link(&self, id: &ResourceId) -> Result<Option<ServedLink>>;
}

/// Build the record store named by the configuration.
pub async fn from_config(config: &RecordsConfig) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.backend {
        RecordsBackend::Json => Arc::new(JsonRecordStore::open(&config.path).await?),
        RecordsBackend::Memory => Arc::new(MemoryRecordStore::new()),
    };
    Ok(store)
}
