//! AWS S3 object store.
//!
//! Objects are written to `s3://{bucket}/{key}` with their content type and
//! the originating URL as `source` user metadata.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{FALLBACK_CONTENT_TYPE, StorageKey, StoredObject};
use crate::storage::{ObjectStore, SOURCE_METADATA_KEY};

/// S3-based object storage.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Create S3 storage with credentials and region from the environment.
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), bucket)
    }

    fn location(&self, key: &StorageKey) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &StorageKey, object: &StoredObject) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .body(ByteStream::from(object.bytes.to_vec()))
            .content_type(&object.content_type);
        if let Some(source) = &object.source_url {
            request = request.metadata(SOURCE_METADATA_KEY, source);
        }

        request
            .send()
            .await
            .map_err(|e| AppError::S3(e.into_service_error().to_string()))?;

        info!("Wrote {} bytes to {}", object.bytes.len(), self.location(key));
        Ok(())
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<StoredObject>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await;

        match result {
            Ok(output) => {
                let content_type = output
                    .content_type()
                    .unwrap_or(FALLBACK_CONTENT_TYPE)
                    .to_string();
                let source_url = output
                    .metadata()
                    .and_then(|m| m.get(SOURCE_METADATA_KEY))
                    .cloned();
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::S3(e.to_string()))?
                    .into_bytes();

                Ok(Some(StoredObject {
                    bytes,
                    content_type,
                    source_url,
                }))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    debug!("No object at {}", self.location(key));
                    Ok(None)
                } else {
                    Err(AppError::S3(service_err.to_string()))
                }
            }
        }
    }

    async fn delete(&self, key: &StorageKey) -> Result<()> {
        // S3 reports success for keys that do not exist.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| AppError::S3(e.into_service_error().to_string()))?;

        info!("Deleted {}", self.location(key));
        Ok(())
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::S3(service_err.to_string()))
                }
            }
        }
    }
}
