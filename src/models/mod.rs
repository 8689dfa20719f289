// src/models/mod.rs

//! Domain models for the ingestion service.

mod config;
mod image;
mod task;

pub use config::{
    AppConfig, ContentTypePolicy, FetcherConfig, LoggingConfig, PipelineConfig, QueueConfig,
    RecordsBackend, RecordsConfig, ServerConfig, ServingConfig, SourcePolicy, StorageBackend,
    StorageConfig,
};
pub use image::{
    FALLBACK_CONTENT_TYPE, FetchedImage, IngestedImage, ResourceId, ServedLink, ServingOptions,
    SourceRef, StorageKey, StoredObject, is_http_scheme,
};
pub use task::{DeadLetter, IngestTask, REDELIVERY_PATH, RetryOptions, TaskId};
