//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
///
/// Built once at startup (load, env overrides, validate) and shared behind an
/// `Arc`. Nothing in the crate reads configuration lazily.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub serving: ServingConfig,

    #[serde(default)]
    pub records: RecordsConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or the defaults when the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("No config file at {:?}. Using defaults.", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(root) = non_empty("IMAGES_ROOT") {
            self.storage.root = root;
        }
        if let Some(bucket) = non_empty("STORAGE_BUCKET") {
            self.storage.bucket = Some(bucket);
        }
        if let Some(host) = non_empty("SERVING_HOST") {
            self.serving.host = host;
        }
        if let Some(secret) = non_empty("SERVING_SECRET") {
            self.serving.signing_secret = secret;
        }
        if let Some(path) = non_empty("RECORDS_PATH") {
            self.records.path = PathBuf::from(path);
        }
        if let Some(token) = non_empty("REDELIVERY_TOKEN") {
            self.queue.redelivery_token = token;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.trim_matches('/').trim().is_empty() {
            return Err(AppError::config("storage.root is empty"));
        }
        if self.storage.backend == StorageBackend::S3
            && self.storage.bucket.as_deref().is_none_or(|b| b.trim().is_empty())
        {
            return Err(AppError::config(
                "storage.bucket is required for the s3 backend",
            ));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::config("fetcher.timeout_secs must be > 0"));
        }
        if self.fetcher.max_bytes == 0 {
            return Err(AppError::config("fetcher.max_bytes must be > 0"));
        }
        if self.fetcher.allowed_content_types.is_empty() {
            return Err(AppError::config("fetcher.allowed_content_types is empty"));
        }
        if self.serving.host.trim().is_empty() {
            return Err(AppError::config("serving.host is empty"));
        }
        if self.serving.size == 0 {
            return Err(AppError::config("serving.size must be > 0"));
        }
        if self.serving.ttl_secs == 0 {
            return Err(AppError::config("serving.ttl_secs must be > 0"));
        }
        check_secret("serving.signing_secret", &self.serving.signing_secret)?;
        if self.queue.capacity == 0 {
            return Err(AppError::config("queue.capacity must be > 0"));
        }
        if self.queue.max_backoff_secs < self.queue.min_backoff_secs {
            return Err(AppError::config(
                "queue.max_backoff_secs must be >= queue.min_backoff_secs",
            ));
        }
        check_secret("queue.redelivery_token", &self.queue.redelivery_token)?;
        if self.pipeline.deadline_secs == 0 {
            return Err(AppError::config("pipeline.deadline_secs must be > 0"));
        }
        Ok(())
    }
}

/// Placeholder values that must never reach a running service.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "changeme", "secret"];

fn check_secret(name: &str, value: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::config(format!("{name} is not set")));
    }
    if PLACEHOLDER_SECRETS
        .iter()
        .any(|p| value.eq_ignore_ascii_case(p))
    {
        return Err(AppError::config(format!("{name} is a placeholder value")));
    }
    Ok(())
}

/// Object store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Memory,
    S3,
}

/// Object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root of the key space; keys are `<root>/<resource id>`
    #[serde(default = "defaults::storage_root")]
    pub root: String,

    /// Directory for the local backend
    #[serde(default = "defaults::local_dir")]
    pub local_dir: PathBuf,

    /// Bucket for the s3 backend
    #[serde(default)]
    pub bucket: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: defaults::storage_root(),
            local_dir: defaults::local_dir(),
            bucket: None,
        }
    }
}

/// What to do with a fetched content type outside the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentTypePolicy {
    /// Capture the verdict as metadata and store anyway
    #[default]
    Record,
    /// Refuse before anything is persisted
    Reject,
}

/// Source fetching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Largest accepted body in bytes
    #[serde(default = "defaults::max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "defaults::allowed_content_types")]
    pub allowed_content_types: Vec<String>,

    #[serde(default)]
    pub content_type_policy: ContentTypePolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_bytes: defaults::max_bytes(),
            allowed_content_types: defaults::allowed_content_types(),
            content_type_policy: ContentTypePolicy::default(),
        }
    }
}

/// Serving handle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    /// Public host that serves `/serve/<handle>`
    #[serde(default = "defaults::serving_host")]
    pub host: String,

    /// Display size applied to every handle
    #[serde(default = "defaults::serving_size")]
    pub size: u32,

    /// Mint `https` URLs
    #[serde(default = "defaults::enabled")]
    pub secure: bool,

    /// Handle lifetime in seconds
    #[serde(default = "defaults::serving_ttl")]
    pub ttl_secs: u64,

    /// No default; `validate` fails until one is configured
    #[serde(default)]
    pub signing_secret: String,

    /// Persist the live-handle table here when set
    #[serde(default)]
    pub handles_path: Option<PathBuf>,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            host: defaults::serving_host(),
            size: defaults::serving_size(),
            secure: true,
            ttl_secs: defaults::serving_ttl(),
            signing_secret: String::new(),
            handles_path: None,
        }
    }
}

/// Record store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordsBackend {
    #[default]
    Json,
    Memory,
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    #[serde(default)]
    pub backend: RecordsBackend,

    #[serde(default = "defaults::records_path")]
    pub path: PathBuf,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            backend: RecordsBackend::default(),
            path: defaults::records_path(),
        }
    }
}

/// Delivery queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Bounded queue length; a full queue refuses new tasks
    #[serde(default = "defaults::queue_capacity")]
    pub capacity: usize,

    /// Additional attempts after the first delivery
    #[serde(default = "defaults::retry_limit")]
    pub retry_limit: u32,

    #[serde(default = "defaults::min_backoff")]
    pub min_backoff_secs: u64,

    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_secs: u64,

    /// Shared secret a redelivering queue presents to the HTTP endpoint.
    /// No default; `validate` fails until one is configured.
    #[serde(default)]
    pub redelivery_token: String,
}

impl QueueConfig {
    pub fn min_backoff(&self) -> Duration {
        Duration::from_secs(self.min_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::queue_capacity(),
            retry_limit: defaults::retry_limit(),
            min_backoff_secs: defaults::min_backoff(),
            max_backoff_secs: defaults::max_backoff(),
            redelivery_token: String::new(),
        }
    }
}

/// How a source reference that is not an HTTP(S) URL is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourcePolicy {
    /// Accept the resource's own storage key and re-mint its handle
    #[default]
    StoredKey,
    /// Only external URLs are accepted
    Reject,
}

/// Pipeline behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub source_policy: SourcePolicy,

    /// Serialize ingest/delete per resource id
    #[serde(default)]
    pub serialize_per_resource: bool,

    /// Deadline for one synchronous ingest or delete
    #[serde(default = "defaults::deadline")]
    pub deadline_secs: u64,
}

impl PipelineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_policy: SourcePolicy::default(),
            serialize_per_resource: false,
            deadline_secs: defaults::deadline(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::bind(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            json: false,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Storage defaults
    pub fn storage_root() -> String {
        "product-images".into()
    }
    pub fn local_dir() -> PathBuf {
        PathBuf::from("storage/objects")
    }

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; image-ingest/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_bytes() -> u64 {
        10 * 1024 * 1024
    }
    pub fn allowed_content_types() -> Vec<String> {
        vec![
            "image/png".into(),
            "image/jpg".into(),
            "image/jpeg".into(),
        ]
    }

    // Serving defaults
    pub fn serving_host() -> String {
        "localhost:8080".into()
    }
    pub fn serving_size() -> u32 {
        450
    }
    pub fn serving_ttl() -> u64 {
        24 * 60 * 60
    }
    pub fn enabled() -> bool {
        true
    }

    // Records defaults
    pub fn records_path() -> PathBuf {
        PathBuf::from("storage/records.json")
    }

    // Queue defaults
    pub fn queue_capacity() -> usize {
        1024
    }
    pub fn retry_limit() -> u32 {
        2
    }
    pub fn min_backoff() -> u64 {
        2
    }
    pub fn max_backoff() -> u64 {
        60
    }

    // Pipeline defaults
    pub fn deadline() -> u64 {
        60
    }

    // Server and logging defaults
    pub fn bind() -> String {
        "0.0.0.0:8080".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.serving.signing_secret = "0b7c9e1f".to_string();
        config.queue.redelivery_token = "4d2a61c3".to_string();
        config
    }

    #[test]
    fn validate_configured_defaults_ok() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn validate_rejects_unset_secrets() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("is not set"), "got {err}");

        let mut config = configured();
        config.queue.redelivery_token = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_placeholder_secrets() {
        let mut config = configured();
        config.queue.redelivery_token = "change-me".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue.redelivery_token"), "got {err}");

        let mut config = configured();
        config.serving.signing_secret = "CHANGE-ME".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_or_default_only_falls_back_for_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();

        let missing = AppConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert!(missing.queue.redelivery_token.is_empty());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[queue\nredelivery_token = ").unwrap();
        assert!(AppConfig::load_or_default(&broken).is_err());
    }

    #[test]
    fn validate_rejects_empty_root() {
        let mut config = configured();
        config.storage.root = "//".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_bucket_for_s3() {
        let mut config = configured();
        config.storage.backend = StorageBackend::S3;
        assert!(config.validate().is_err());

        config.storage.bucket = Some("images".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_backoff() {
        let mut config = configured();
        config.queue.min_backoff_secs = 10;
        config.queue.max_backoff_secs = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_match_delivery_policy() {
        let config = AppConfig::default();
        assert_eq!(config.queue.retry_limit, 2);
        assert_eq!(config.queue.min_backoff(), Duration::from_secs(2));
        assert_eq!(config.serving.size, 450);
        assert!(config.serving.secure);
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("IMAGES_ROOT", "catalog"),
            ("STORAGE_BUCKET", "bucket-a"),
            ("REDELIVERY_TOKEN", "  "),
        ]);
        let mut config = configured();
        config.apply_env_from(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.root, "catalog");
        assert_eq!(config.storage.bucket.as_deref(), Some("bucket-a"));
        // blank values are ignored
        assert_eq!(config.queue.redelivery_token, "4d2a61c3");
    }

    #[test]
    fn parses_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [storage]
            backend = "memory"
            root = "/products/"

            [fetcher]
            content_type_policy = "reject"

            [pipeline]
            source_policy = "reject"
            serialize_per_resource = true
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.fetcher.content_type_policy, ContentTypePolicy::Reject);
        assert_eq!(config.pipeline.source_policy, SourcePolicy::Reject);
        assert!(config.pipeline.serialize_per_resource);
        assert_eq!(config.serving.size, 450);
    }
}
