//! Object storage for ingested image bytes.
//!
//! Every object lives under a key derived from its resource id:
//!
//! ```text
//! {root}/
//! ├── 41            # image bytes
//! ├── 42
//! └── ...
//! ```
//!
//! Writes overwrite and deletes of absent keys succeed, so a retried
//! ingestion or deletion converges on the same end state.

pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{StorageBackend, StorageConfig, StorageKey, StoredObject};

// Re-export for convenience
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

/// Metadata key carrying the originating URL of an object.
pub const SOURCE_METADATA_KEY: &str = "source";

/// Key-addressed blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write (or overwrite) the object at `key`.
    async fn put(&self, key: &StorageKey, object: &StoredObject) -> Result<()>;

    /// Read the object at `key`, `None` if absent.
    async fn get(&self, key: &StorageKey) -> Result<Option<StoredObject>>;

    /// Remove the object at `key`. Absent keys are not an error.
    async fn delete(&self, key: &StorageKey) -> Result<()>;

    /// Check whether an object exists at `key`.
    async fn exists(&self, key: &StorageKey) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Build the object store named by the configuration.
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config.backend {
        StorageBackend::Local => Arc::new(LocalObjectStore::new(&config.local_dir)),
        StorageBackend::Memory => Arc::new(MemoryObjectStore::new()),
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            let bucket = config
                .bucket
                .clone()
                .ok_or_else(|| crate::error::AppError::config("storage.bucket is not set"))?;
            Arc::new(s3::S3ObjectStore::from_env(bucket).await)
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => {
            return Err(crate::error::AppError::config(
                "storage.backend = \"s3\" requires the `s3` feature",
            ));
        }
    };
    Ok(store)
}
