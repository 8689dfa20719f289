//! In-memory object store for tests and ephemeral runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{StorageKey, StoredObject};
use crate::storage::ObjectStore;

/// Object store held in a map.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<StorageKey, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &StorageKey, object: &StoredObject) -> Result<()> {
        self.objects.write().await.insert(key.clone(), object.clone());
        Ok(())
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<StoredObject>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &StorageKey) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }
}
