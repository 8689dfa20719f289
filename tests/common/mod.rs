//! Shared fixtures: memory adapters and a scripted fetcher.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use image_ingest::App;
use image_ingest::error::{AppError, Result};
use image_ingest::models::{AppConfig, FetchedImage, ResourceId, StorageBackend};
use image_ingest::pipeline::Adapters;
use image_ingest::records::MemoryRecordStore;
use image_ingest::serving::SignedHandleService;
use image_ingest::services::Fetcher;
use image_ingest::storage::MemoryObjectStore;
use image_ingest::utils::is_allowed_content_type;

pub const HOST: &str = "img.example.test";
pub const ROOT: &str = "product-images";
pub const TOKEN: &str = "queue-secret";

/// A canned source response.
#[derive(Debug, Clone)]
pub enum Source {
    Image { bytes: Bytes, content_type: String },
    Status(u16),
}

impl Source {
    pub fn jpeg(len: usize) -> Self {
        Self::Image {
            bytes: Bytes::from(vec![0xAB; len]),
            content_type: "image/jpeg".to_string(),
        }
    }

    /// A real PNG of the given dimensions.
    pub fn png(width: u32, height: u32) -> Self {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        Self::Image {
            bytes: Bytes::from(buf),
            content_type: "image/png".to_string(),
        }
    }

    pub fn typed(bytes: &'static [u8], content_type: &str) -> Self {
        Self::Image {
            bytes: Bytes::from_static(bytes),
            content_type: content_type.to_string(),
        }
    }
}

/// Fetcher answering from a fixed table of URLs.
#[derive(Default)]
pub struct ScriptedFetcher {
    sources: Mutex<HashMap<String, Source>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn respond(&self, url: &str, source: Source) {
        self.sources.lock().unwrap().insert(url.to_string(), source);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, destination: &str) -> Result<FetchedImage> {
        if destination.is_empty() {
            return Err(AppError::validation("no destination key given"));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let source = self.sources.lock().unwrap().get(url).cloned();
        match source {
            Some(Source::Image {
                bytes,
                content_type,
            }) => {
                let allowed = is_allowed_content_type(
                    &content_type,
                    &AppConfig::default().fetcher.allowed_content_types,
                );
                Ok(FetchedImage {
                    bytes,
                    content_type: Some(content_type),
                    allowed,
                })
            }
            Some(Source::Status(code)) => Err(AppError::fetch(url, format!("got status {code}"))),
            None => Err(AppError::fetch(url, "connection refused")),
        }
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.backend = StorageBackend::Memory;
    config.storage.root = ROOT.to_string();
    config.serving.host = HOST.to_string();
    config.serving.signing_secret = "test-signing-key".to_string();
    config.queue.redelivery_token = TOKEN.to_string();
    config.queue.min_backoff_secs = 0;
    config.queue.max_backoff_secs = 0;
    config
}

pub fn id(raw: &str) -> ResourceId {
    ResourceId::parse(raw).unwrap()
}

/// Concrete handles onto the adapters an `App` was wired with.
pub struct Harness {
    pub app: Arc<App>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub objects: Arc<MemoryObjectStore>,
    pub handles: Arc<SignedHandleService>,
    pub records: Arc<MemoryRecordStore>,
}

pub fn harness() -> Harness {
    harness_with(test_config(), ScriptedFetcher::new())
}

pub fn harness_with(config: AppConfig, fetcher: ScriptedFetcher) -> Harness {
    let fetcher = Arc::new(fetcher);
    let objects = Arc::new(MemoryObjectStore::new());
    let handles = Arc::new(SignedHandleService::new(objects.clone(), &config.serving));
    let records = Arc::new(MemoryRecordStore::with_records(&[id("41"), id("42"), id("43")]));

    let adapters = Adapters {
        fetcher: fetcher.clone(),
        objects: objects.clone(),
        handles: handles.clone(),
        records: records.clone(),
    };

    Harness {
        app: Arc::new(App::with_adapters(Arc::new(config), adapters)),
        fetcher,
        objects,
        handles,
        records,
    }
}

/// Poll `check` until it holds or a second has passed.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
