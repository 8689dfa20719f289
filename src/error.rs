// src/error.rs

//! Unified error handling for the ingestion service.

use std::fmt;

use thiserror::Error;

const MISSING_OBJECT: &str = "no stored object";

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
///
/// The pipeline-level variants (`FetchFailed` through `EnqueueFailed`) always
/// carry the key or resource id they were working on, so a caller can tell
/// which step failed for which asset without looking at adapter internals.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing resource id, missing or malformed source reference
    #[error("Validation error: {0}")]
    Validation(String),

    /// Source unreachable or non-success status
    #[error("Fetch failed for {url}: {message}")]
    FetchFailed { url: String, message: String },

    /// Source answered with a content type outside the allow-list
    #[error("Unsupported content type {content_type:?} from {url}")]
    UnsupportedContentType { url: String, content_type: String },

    /// Object store write failed
    #[error("Persisting {key} failed: {message}")]
    PersistFailed { key: String, message: String },

    /// Object store delete failed
    #[error("Deleting {key} failed: {message}")]
    PersistDeletionFailed { key: String, message: String },

    /// Serving handle could not be minted
    #[error("Creating serving URL for {key} failed: {message}")]
    HandleCreationFailed { key: String, message: String },

    /// Serving handle could not be revoked
    #[error("Revoking serving URL for {key} failed: {message}")]
    HandleRevocationFailed { key: String, message: String },

    /// Durable record write failed
    #[error("Updating record {resource_id} failed: {message}")]
    RecordUpdateFailed { resource_id: String, message: String },

    /// Delivery queue refused the task
    #[error("Enqueueing ingestion of {resource_id} failed: {message}")]
    EnqueueFailed { resource_id: String, message: String },

    /// A synchronous call ran past its deadline
    #[error("{operation} exceeded its {secs}s deadline")]
    DeadlineExceeded { operation: String, secs: u64 },

    /// Adapter-level: the addressed object, handle or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Scaling a served image failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a fetch error for a source URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::FetchFailed {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Wrap an object store write error.
    pub fn persist(key: impl fmt::Display, cause: impl fmt::Display) -> Self {
        Self::PersistFailed {
            key: key.to_string(),
            message: cause.to_string(),
        }
    }

    /// Wrap an object store delete error.
    pub fn persist_deletion(key: impl fmt::Display, cause: impl fmt::Display) -> Self {
        Self::PersistDeletionFailed {
            key: key.to_string(),
            message: cause.to_string(),
        }
    }

    /// Wrap a serving handle mint error.
    pub fn handle_creation(key: impl fmt::Display, cause: impl fmt::Display) -> Self {
        Self::HandleCreationFailed {
            key: key.to_string(),
            message: cause.to_string(),
        }
    }

    /// Wrap a serving handle revoke error.
    pub fn handle_revocation(key: impl fmt::Display, cause: impl fmt::Display) -> Self {
        Self::HandleRevocationFailed {
            key: key.to_string(),
            message: cause.to_string(),
        }
    }

    /// Wrap a record store error.
    pub fn record_update(resource_id: impl fmt::Display, cause: impl fmt::Display) -> Self {
        Self::RecordUpdateFailed {
            resource_id: resource_id.to_string(),
            message: cause.to_string(),
        }
    }

    /// Wrap a delivery queue submission error.
    pub fn enqueue(resource_id: impl fmt::Display, cause: impl fmt::Display) -> Self {
        Self::EnqueueFailed {
            resource_id: resource_id.to_string(),
            message: cause.to_string(),
        }
    }

    /// Mint refused because nothing is stored under `key`.
    pub fn missing_object(key: impl fmt::Display) -> Self {
        Self::handle_creation(key, MISSING_OBJECT)
    }

    /// Whether a mint failed only because the backing object is absent.
    pub fn is_missing_object(&self) -> bool {
        matches!(self, Self::HandleCreationFailed { message, .. } if message == MISSING_OBJECT)
    }

    /// Whether this is a caller error rather than a downstream failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_keep_context() {
        let err = AppError::persist("product-images/42", "bucket unavailable");
        let text = err.to_string();
        assert!(text.contains("product-images/42"));
        assert!(text.contains("bucket unavailable"));

        let err = AppError::record_update("42", AppError::not_found("record 42"));
        assert!(err.to_string().contains("record 42"));
    }

    #[test]
    fn test_is_validation() {
        assert!(AppError::validation("empty id").is_validation());
        assert!(!AppError::fetch("https://example.test/a.png", "404").is_validation());
    }

    #[test]
    fn test_missing_object_is_a_handle_creation_failure() {
        let err = AppError::missing_object("product-images/42");
        assert!(matches!(err, AppError::HandleCreationFailed { .. }));
        assert!(err.is_missing_object());
        assert!(!AppError::handle_creation("product-images/42", "io").is_missing_object());
    }
}
