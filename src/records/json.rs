//! JSON-file record store.
//!
//! The whole table lives in one file, rewritten atomically after every
//! update. Suitable for development and small single-node deployments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ResourceId, ServedLink};
use crate::records::RecordStore;
use crate::utils::fs;

type Table = BTreeMap<ResourceId, ServedLink>;

/// Record store backed by a JSON map of id to link fields.
pub struct JsonRecordStore {
    path: PathBuf,
    table: Mutex<Table>,
}

impl JsonRecordStore {
    /// Open the store, starting empty if the file doesn't exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table: Table = fs::read_json(&path).await?.unwrap_or_default();
        tracing::debug!("Loaded {} records from {}", table.len(), path.display());
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Add empty records for the given ids, keeping existing ones.
    pub async fn ensure_records(&self, ids: &[ResourceId]) -> Result<()> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        for id in ids {
            next.entry(id.clone()).or_default();
        }
        fs::write_json(&self.path, &next).await?;
        *table = next;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn update_link(&self, id: &ResourceId, link: &ServedLink) -> Result<()> {
        let mut table = self.table.lock().await;
        if !table.contains_key(id) {
            return Err(AppError::not_found(format!("record {id}")));
        }

        let mut next = table.clone();
        next.insert(id.clone(), link.clone());
        fs::write_json(&self.path, &next).await?;
        *table = next;
        Ok(())
    }

    async fn get_link(&self, id: &ResourceId) -> Result<Option<ServedLink>> {
        Ok(self.table.lock().await.get(id).cloned())
    }
}
