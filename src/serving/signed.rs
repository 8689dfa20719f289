// src/serving/signed.rs

//! Signed serving handles.
//!
//! Each handle is an unguessable token derived from a server secret, the
//! storage key, a random nonce and the expiry instant. The table of live
//! handles is kept in memory and, when a path is configured, mirrored to a
//! JSON file so handles survive a restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ServingConfig, ServingOptions, StorageKey};
use crate::serving::{ResolvedHandle, SERVE_PATH, ServingHandles, handle_token};
use crate::storage::ObjectStore;
use crate::utils::fs;

/// Longest lifetime honoured, whatever the configuration says.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// One live handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Grant {
    token: String,
    size: u32,
    secure: bool,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Grant {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Live handles by key, plus the reverse token index.
#[derive(Debug, Clone, Default)]
struct HandleTable {
    by_key: HashMap<StorageKey, Grant>,
    tokens: HashMap<String, StorageKey>,
}

impl HandleTable {
    fn from_grants(grants: HashMap<StorageKey, Grant>, now: DateTime<Utc>) -> Self {
        let by_key: HashMap<_, _> = grants.into_iter().filter(|(_, g)| g.is_live(now)).collect();
        let tokens = by_key
            .iter()
            .map(|(key, grant)| (grant.token.clone(), key.clone()))
            .collect();
        Self { by_key, tokens }
    }

    fn insert(&mut self, key: StorageKey, grant: Grant) {
        self.tokens.insert(grant.token.clone(), key.clone());
        if let Some(previous) = self.by_key.insert(key, grant) {
            self.tokens.remove(&previous.token);
        }
    }

    fn remove(&mut self, key: &StorageKey) -> Option<Grant> {
        let grant = self.by_key.remove(key)?;
        self.tokens.remove(&grant.token);
        Some(grant)
    }
}

/// Serving handle provider issuing signed, expiring URLs.
pub struct SignedHandleService {
    objects: Arc<dyn ObjectStore>,
    host: String,
    secret: String,
    ttl: Duration,
    persist_path: Option<PathBuf>,
    table: Mutex<HandleTable>,
}

impl SignedHandleService {
    /// Create a provider with an empty, memory-only handle table.
    pub fn new(objects: Arc<dyn ObjectStore>, config: &ServingConfig) -> Self {
        Self {
            objects,
            host: config.host.trim().trim_end_matches('/').to_string(),
            secret: config.signing_secret.clone(),
            ttl: Duration::seconds(config.ttl_secs.min(MAX_TTL_SECS) as i64),
            persist_path: None,
            table: Mutex::new(HandleTable::default()),
        }
    }

    /// Create a provider, restoring live handles from `handles_path` if set.
    pub async fn open(objects: Arc<dyn ObjectStore>, config: &ServingConfig) -> Result<Self> {
        let mut service = Self::new(objects, config);
        if let Some(path) = &config.handles_path {
            let grants: HashMap<StorageKey, Grant> =
                fs::read_json(path).await?.unwrap_or_default();
            let table = HandleTable::from_grants(grants, Utc::now());
            tracing::info!(
                "Restored {} live serving handles from {}",
                table.by_key.len(),
                path.display()
            );
            service.table = Mutex::new(table);
            service.persist_path = Some(path.clone());
        }
        Ok(service)
    }

    /// Number of live handles.
    pub async fn live_count(&self) -> usize {
        let now = Utc::now();
        self.table
            .lock()
            .await
            .by_key
            .values()
            .filter(|g| g.is_live(now))
            .count()
    }

    fn sign(&self, key: &StorageKey, nonce: &Uuid, expires_at: DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update([0u8]);
        hasher.update(key.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(nonce.as_bytes());
        hasher.update(expires_at.timestamp().to_be_bytes());
        hex::encode(hasher.finalize())
    }

    fn url_for(&self, token: &str, options: &ServingOptions) -> String {
        let scheme = if options.secure { "https" } else { "http" };
        format!("{}://{}{}/{}=s{}", scheme, self.host, SERVE_PATH, token, options.size)
    }

    /// Write the table if persistence is enabled.
    async fn persist(&self, table: &HandleTable) -> Result<()> {
        if let Some(path) = &self.persist_path {
            fs::write_json(path, &table.by_key).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ServingHandles for SignedHandleService {
    async fn mint(&self, key: &StorageKey, options: &ServingOptions) -> Result<String> {
        if !self.objects.exists(key).await? {
            return Err(AppError::not_found(format!("no stored object at {key}")));
        }

        let issued_at = Utc::now();
        let expires_at = issued_at + self.ttl;
        let token = self.sign(key, &Uuid::new_v4(), expires_at);
        let grant = Grant {
            token: token.clone(),
            size: options.size,
            secure: options.secure,
            issued_at,
            expires_at,
        };

        let mut table = self.table.lock().await;
        let mut next = table.clone();
        next.insert(key.clone(), grant);
        self.persist(&next).await?;
        *table = next;

        tracing::debug!(key = %key, %expires_at, "minted serving handle");
        Ok(self.url_for(&token, options))
    }

    async fn revoke(&self, key: &StorageKey) -> Result<()> {
        let mut table = self.table.lock().await;
        if !table.by_key.contains_key(key) {
            tracing::debug!(key = %key, "no serving handle to revoke");
            return Ok(());
        }

        let mut next = table.clone();
        next.remove(key);
        self.persist(&next).await?;
        *table = next;

        tracing::debug!(key = %key, "revoked serving handle");
        Ok(())
    }

    async fn resolve(&self, handle: &str) -> Result<Option<ResolvedHandle>> {
        let Some(token) = handle_token(handle) else {
            return Ok(None);
        };

        let mut table = self.table.lock().await;
        let Some(key) = table.tokens.get(token).cloned() else {
            return Ok(None);
        };
        let Some(grant) = table.by_key.get(&key).cloned() else {
            return Ok(None);
        };

        if !grant.is_live(Utc::now()) {
            // The persisted copy is filtered on load, so pruning memory is enough.
            table.remove(&key);
            return Ok(None);
        }

        Ok(Some(ResolvedHandle {
            key,
            size: grant.size,
            expires_at: grant.expires_at,
        }))
    }
}
