//! Local filesystem object store.
//!
//! Used for development and single-node deployments. Production deployments
//! should use the S3 backend.
//!
//! ## Storage Layout
//!
//! ```text
//! {root_dir}/
//! ├── objects/{root}/42       # image bytes
//! ├── meta/{root}/42.json     # content type and provenance
//! └── tmp/                    # in-flight writes, renamed into place
//! ```
//!
//! Only `objects/` is addressed by storage keys, so no resource id can name
//! another resource's sidecar or temp file.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{FALLBACK_CONTENT_TYPE, StorageKey, StoredObject};
use crate::storage::ObjectStore;
use crate::utils::fs;

const OBJECTS_DIR: &str = "objects";
const META_DIR: &str = "meta";
const TMP_DIR: &str = "tmp";

/// Sidecar written for each object.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
    #[serde(default)]
    source: Option<String>,
    size: usize,
    stored_at: DateTime<Utc>,
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root_dir: PathBuf,
}

impl LocalObjectStore {
    /// Create a new store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a key.
    fn path(&self, key: &StorageKey) -> PathBuf {
        self.root_dir.join(OBJECTS_DIR).join(key.as_str())
    }

    fn meta_path(&self, key: &StorageKey) -> PathBuf {
        fs::with_suffix(&self.root_dir.join(META_DIR).join(key.as_str()), ".json")
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root_dir.join(TMP_DIR)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &StorageKey, object: &StoredObject) -> Result<()> {
        let path = self.path(key);
        let meta = ObjectMeta {
            content_type: object.content_type.clone(),
            source: object.source_url.clone(),
            size: object.bytes.len(),
            stored_at: Utc::now(),
        };

        let tmp_dir = self.tmp_dir();
        fs::write_atomic_in(&tmp_dir, &path, &object.bytes).await?;
        fs::write_atomic_in(&tmp_dir, &self.meta_path(key), &serde_json::to_vec_pretty(&meta)?)
            .await?;

        tracing::debug!(key = %key, bytes = object.bytes.len(), "wrote object to {}", path.display());
        Ok(())
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<StoredObject>> {
        let path = self.path(key);
        let Some(bytes) = fs::read_optional(&path).await? else {
            return Ok(None);
        };

        let meta: Option<ObjectMeta> = match fs::read_optional(&self.meta_path(key)).await? {
            Some(raw) => Some(serde_json::from_slice(&raw)?),
            None => None,
        };

        Ok(Some(StoredObject {
            bytes: Bytes::from(bytes),
            content_type: meta
                .as_ref()
                .map(|m| m.content_type.clone())
                .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
            source_url: meta.and_then(|m| m.source),
        }))
    }

    async fn delete(&self, key: &StorageKey) -> Result<()> {
        let path = self.path(key);
        fs::remove_if_exists(&path).await?;
        fs::remove_if_exists(&self.meta_path(key)).await?;
        tracing::debug!(key = %key, "deleted object");
        Ok(())
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(key)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceId;
    use tempfile::TempDir;

    fn key(id: &str) -> StorageKey {
        StorageKey::derive("product-images", &ResourceId::parse(id).unwrap())
    }

    fn object(bytes: &'static [u8]) -> StoredObject {
        StoredObject {
            bytes: Bytes::from_static(bytes),
            content_type: "image/png".to_string(),
            source_url: Some("https://example.test/a.png".to_string()),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(tmp.path());

        store.put(&key("42"), &object(b"hello")).await.unwrap();
        let loaded = store.get(&key("42")).await.unwrap().unwrap();

        assert_eq!(loaded, object(b"hello"));
        assert!(tmp.path().join("objects/product-images/42").exists());
        assert!(tmp.path().join("meta/product-images/42.json").exists());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(tmp.path());

        store.put(&key("42"), &object(b"first")).await.unwrap();
        store.put(&key("42"), &object(b"second")).await.unwrap();

        let loaded = store.get(&key("42")).await.unwrap().unwrap();
        assert_eq!(loaded.bytes, Bytes::from_static(b"second"));
        let leftovers = std::fs::read_dir(tmp.path().join("tmp")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(tmp.path());

        assert!(store.get(&key("nope")).await.unwrap().is_none());
        assert!(!store.exists(&key("nope")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(tmp.path());

        store.put(&key("42"), &object(b"hello")).await.unwrap();
        store.delete(&key("42")).await.unwrap();
        store.delete(&key("42")).await.unwrap();

        assert!(!store.exists(&key("42")).await.unwrap());
        assert!(!tmp.path().join("meta/product-images/42.json").exists());
    }

    #[tokio::test]
    async fn test_missing_sidecar_falls_back() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(tmp.path());

        let path = tmp.path().join("objects/product-images/7");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"raw").unwrap();

        let loaded = store.get(&key("7")).await.unwrap().unwrap();
        assert_eq!(loaded.content_type, FALLBACK_CONTENT_TYPE);
        assert!(loaded.source_url.is_none());
    }

    #[tokio::test]
    async fn test_lookalike_ids_keep_their_own_objects() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(tmp.path());

        store.put(&key("42"), &object(b"plain")).await.unwrap();
        store.put(&key("42.meta.json"), &object(b"sidecar-like")).await.unwrap();
        store.put(&key("42.json"), &object(b"json-like")).await.unwrap();
        store.put(&key("42.tmp"), &object(b"temp-like")).await.unwrap();

        let loaded = store.get(&key("42")).await.unwrap().unwrap();
        assert_eq!(loaded, object(b"plain"));

        store.delete(&key("42")).await.unwrap();

        assert!(!store.exists(&key("42")).await.unwrap());
        for (id, bytes) in [
            ("42.meta.json", &b"sidecar-like"[..]),
            ("42.json", &b"json-like"[..]),
            ("42.tmp", &b"temp-like"[..]),
        ] {
            let other = store.get(&key(id)).await.unwrap().unwrap();
            assert_eq!(other.bytes, Bytes::copy_from_slice(bytes), "object for {id}");
            assert_eq!(other.content_type, "image/png");
        }
    }
}
