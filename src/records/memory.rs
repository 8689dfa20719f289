//! In-memory record store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{ResourceId, ServedLink};
use crate::records::RecordStore;

/// Record store held in a map; records must be seeded before update.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<ResourceId, ServedLink>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding empty records for the given ids.
    pub fn with_records<'a>(ids: impl IntoIterator<Item = &'a ResourceId>) -> Self {
        let records = ids
            .into_iter()
            .map(|id| (id.clone(), ServedLink::default()))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Insert an empty record.
    pub async fn insert(&self, id: ResourceId) {
        self.records.write().await.entry(id).or_default();
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn update_link(&self, id: &ResourceId, link: &ServedLink) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("record {id}")))?;
        *record = link.clone();
        Ok(())
    }

    async fn get_link(&self, id: &ResourceId) -> Result<Option<ServedLink>> {
        Ok(self.records.read().await.get(id).cloned())
    }
}
