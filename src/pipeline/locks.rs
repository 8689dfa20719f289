//! Per-resource mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::ResourceId;

/// Hands out one async lock per resource id.
///
/// The guard releases on drop, so every exit path of a pipeline (error,
/// deadline, panic) unlocks. Entries nobody holds or waits on are pruned.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<ResourceId, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: &ResourceId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(id.clone()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Number of ids currently tracked.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
