// src/app.rs

//! Application wiring.
//!
//! Configuration is loaded and validated once, then passed to every
//! component explicitly.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::error::Result;
use crate::models::{AppConfig, RetryOptions};
use crate::pipeline::{Adapters, DeletionPipeline, Dispatcher, IngestionPipeline, KeyLocks};
use crate::queue::{InMemoryTaskQueue, QueueWorker, WorkerHandle};
use crate::records;
use crate::serving::SignedHandleService;
use crate::services::HttpFetcher;
use crate::storage;

/// A fully wired service.
pub struct App {
    pub config: Arc<AppConfig>,
    pub adapters: Adapters,
    pub ingest: Arc<IngestionPipeline>,
    pub delete: Arc<DeletionPipeline>,
    pub dispatcher: Arc<Dispatcher>,
    worker: Mutex<Option<QueueWorker>>,
}

impl App {
    /// Build the adapters named by `config` and wire them up.
    pub async fn build(config: Arc<AppConfig>) -> Result<Self> {
        config.validate()?;

        let fetcher = Arc::new(HttpFetcher::new(&config.fetcher)?);
        let objects = storage::from_config(&config.storage).await?;
        let handles = Arc::new(SignedHandleService::open(objects.clone(), &config.serving).await?);
        let records = records::from_config(&config.records).await?;

        info!(
            storage = ?config.storage.backend,
            records = ?config.records.backend,
            "Adapters ready"
        );

        Ok(Self::with_adapters(
            config,
            Adapters {
                fetcher,
                objects,
                handles,
                records,
            },
        ))
    }

    /// Wire pipelines, queue and dispatcher around existing adapters.
    pub fn with_adapters(config: Arc<AppConfig>, adapters: Adapters) -> Self {
        let mut ingest = IngestionPipeline::new(adapters.clone(), &config);
        let mut delete = DeletionPipeline::new(adapters.clone(), &config);
        if config.pipeline.serialize_per_resource {
            let locks = Arc::new(KeyLocks::new());
            ingest = ingest.with_locks(locks.clone());
            delete = delete.with_locks(locks);
        }
        let ingest = Arc::new(ingest);

        let (queue, worker) = InMemoryTaskQueue::from_config(&config.queue);
        let dispatcher = Arc::new(Dispatcher::new(
            ingest.clone(),
            Arc::new(queue),
            RetryOptions::from_config(&config.queue),
        ));

        Self {
            config,
            adapters,
            ingest,
            delete: Arc::new(delete),
            dispatcher,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Spawn the queue worker. `None` if it was already started.
    pub fn start_worker(&self) -> Option<WorkerHandle> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(worker.spawn(self.dispatcher.clone()))
    }
}
