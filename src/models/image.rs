//! Image and resource identity types.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::SourcePolicy;

/// Content type written for objects whose fetched type is not allow-listed.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Identifier of the durable record an image belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Parse a caller-supplied id.
    ///
    /// Must be non-empty after trimming, must not contain `/` and must not be
    /// a relative path component.
    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(AppError::validation("resource id is empty"));
        }
        if id.contains('/') || id.contains('\\') || id == "." || id == ".." {
            return Err(AppError::validation(format!(
                "resource id {id:?} must not contain path separators"
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

/// Object store key for a resource, always `<root>/<resource id>`.
///
/// The pipelines only ever derive it from a resource id. Reading one back
/// from persisted state goes through `TryFrom<String>`, which refuses text
/// that no derivation could have produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey(String);

impl StorageKey {
    /// Derive the key for a resource under the configured root.
    pub fn derive(root: &str, id: &ResourceId) -> Self {
        let root = root.trim_matches('/');
        if root.is_empty() {
            Self(id.as_str().to_string())
        } else {
            Self(format!("{}/{}", root, id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StorageKey {
    type Error = AppError;

    fn try_from(raw: String) -> Result<Self> {
        let well_formed = !raw.is_empty()
            && raw.trim() == raw
            && !raw.contains('\\')
            && raw
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
        if !well_formed {
            return Err(AppError::validation(format!("{raw:?} is not a storage key")));
        }
        Ok(Self(raw))
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where an ingestion request gets its bytes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// Fetch from a third-party host
    External(Url),
    /// Already resident under the resource's key; only re-mint the handle
    Stored(StorageKey),
}

impl SourceRef {
    /// Classify a raw source reference for a resource.
    pub fn classify(
        raw: &str,
        id: &ResourceId,
        root: &str,
        policy: SourcePolicy,
    ) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::validation("source reference is empty"));
        }

        if is_http_scheme(raw) {
            let url = Url::parse(raw).map_err(|e| {
                AppError::validation(format!("source URL {raw:?} is malformed: {e}"))
            })?;
            if url.host_str().is_none_or(str::is_empty) {
                return Err(AppError::validation(format!(
                    "source URL {raw:?} has no host"
                )));
            }
            return Ok(Self::External(url));
        }

        match policy {
            SourcePolicy::Reject => Err(AppError::validation(format!(
                "source {raw:?} is not an http(s) URL"
            ))),
            SourcePolicy::StoredKey => {
                let key = StorageKey::derive(root, id);
                if raw.trim_start_matches('/') == key.as_str() {
                    Ok(Self::Stored(key))
                } else {
                    Err(AppError::validation(format!(
                        "source {raw:?} is neither an http(s) URL nor the stored key {key}"
                    )))
                }
            }
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External(url) => write!(f, "{url}"),
            Self::Stored(key) => write!(f, "{key}"),
        }
    }
}

/// Case-insensitive `http://` / `https://` prefix check.
pub fn is_http_scheme(raw: &str) -> bool {
    let lower = raw.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Bytes and metadata returned by a fetch.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Bytes,
    /// Normalized content type, if the source sent one
    pub content_type: Option<String>,
    /// Whether `content_type` is in the allow-list
    pub allowed: bool,
}

/// The in-flight unit of one ingestion attempt.
#[derive(Debug, Clone)]
pub struct IngestedImage {
    pub source_url: String,
    pub storage_key: StorageKey,
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub content_type_allowed: bool,
}

impl IngestedImage {
    pub fn new(source_url: &Url, storage_key: StorageKey, fetched: FetchedImage) -> Self {
        Self {
            source_url: source_url.to_string(),
            storage_key,
            bytes: fetched.bytes,
            content_type: fetched.content_type,
            content_type_allowed: fetched.allowed,
        }
    }

    /// The object to write, tagged with its provenance.
    pub fn to_stored_object(&self) -> StoredObject {
        let content_type = match (&self.content_type, self.content_type_allowed) {
            (Some(ct), true) => ct.clone(),
            _ => FALLBACK_CONTENT_TYPE.to_string(),
        };
        StoredObject {
            bytes: self.bytes.clone(),
            content_type,
            source_url: Some(self.source_url.clone()),
        }
    }
}

/// An object as held by the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
    /// Originating URL, kept as provenance metadata
    pub source_url: Option<String>,
}

/// Display policy applied when minting a serving handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingOptions {
    pub size: u32,
    pub secure: bool,
}

/// The two record fields the pipeline owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedLink {
    pub display_url: Option<String>,
    pub storage_location: Option<String>,
}

impl ServedLink {
    pub fn new(display_url: impl Into<String>, key: &StorageKey) -> Self {
        Self {
            display_url: Some(display_url.into()),
            storage_location: Some(key.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_from_persisted_text() {
        let key: StorageKey = serde_json::from_str("\"product-images/42\"").unwrap();
        assert_eq!(key, StorageKey::derive("product-images", &id("42")));

        for raw in ["", "/42", "product-images/", "a//42", "../42", "a/./42", " a/42", "a\\42"] {
            let json = serde_json::to_string(raw).unwrap();
            assert!(
                serde_json::from_str::<StorageKey>(&json).is_err(),
                "{raw:?} should be refused"
            );
        }
    }

    fn id(raw: &str) -> ResourceId {
        ResourceId::parse(raw).unwrap()
    }

    #[test]
    fn test_resource_id_validation() {
        assert!(ResourceId::parse("").is_err());
        assert!(ResourceId::parse("   ").is_err());
        assert!(ResourceId::parse("a/b").is_err());
        assert!(ResourceId::parse("..").is_err());
        assert_eq!(id(" 42 ").as_str(), "42");
    }

    #[test]
    fn test_storage_key_derivation() {
        assert_eq!(StorageKey::derive("product-images", &id("42")).as_str(), "product-images/42");
        assert_eq!(StorageKey::derive("/product-images/", &id("42")).as_str(), "product-images/42");
        assert_eq!(StorageKey::derive("a/b", &id("7")).as_str(), "a/b/7");
    }

    #[test]
    fn test_classify_external() {
        let source = SourceRef::classify(
            "https://example.test/img.jpg",
            &id("42"),
            "root",
            SourcePolicy::StoredKey,
        )
        .unwrap();
        assert!(source.is_external());

        let upper = SourceRef::classify(
            "HTTP://example.test/img.jpg",
            &id("42"),
            "root",
            SourcePolicy::Reject,
        )
        .unwrap();
        assert!(upper.is_external());
    }

    #[test]
    fn test_classify_stored_key() {
        let source =
            SourceRef::classify("root/42", &id("42"), "root", SourcePolicy::StoredKey).unwrap();
        assert_eq!(source, SourceRef::Stored(StorageKey::derive("root", &id("42"))));

        let leading_slash =
            SourceRef::classify("/root/42", &id("42"), "root", SourcePolicy::StoredKey).unwrap();
        assert!(!leading_slash.is_external());
    }

    #[test]
    fn test_classify_rejections() {
        // another resource's key
        assert!(SourceRef::classify("root/43", &id("42"), "root", SourcePolicy::StoredKey).is_err());
        // stored keys refused outright
        assert!(SourceRef::classify("root/42", &id("42"), "root", SourcePolicy::Reject).is_err());
        assert!(SourceRef::classify("", &id("42"), "root", SourcePolicy::StoredKey).is_err());
        assert!(SourceRef::classify("https://", &id("42"), "root", SourcePolicy::StoredKey).is_err());
        assert!(
            SourceRef::classify("ftp://example.test/a.png", &id("42"), "root", SourcePolicy::StoredKey)
                .is_err()
        );
    }

    #[test]
    fn test_stored_object_content_type() {
        let url = Url::parse("https://example.test/a.gif").unwrap();
        let key = StorageKey::derive("root", &id("1"));
        let fetched = FetchedImage {
            bytes: Bytes::from_static(b"GIF89a"),
            content_type: Some("image/gif".into()),
            allowed: false,
        };
        let image = IngestedImage::new(&url, key, fetched);
        let object = image.to_stored_object();
        assert_eq!(object.content_type, FALLBACK_CONTENT_TYPE);
        assert_eq!(object.source_url.as_deref(), Some("https://example.test/a.gif"));
    }
}
