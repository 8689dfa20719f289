// src/services/fetcher.rs

//! Source image fetcher.
//!
//! Downloads the bytes behind an external URL, refusing anything that is not
//! a success status and capturing the content type against the allow-list.

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ContentTypePolicy, FetchedImage, FetcherConfig, is_http_scheme};
use crate::utils::http::create_async_client;
use crate::utils::{is_allowed_content_type, normalize_content_type};

/// Retrieves raw bytes and content type from a source URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` on behalf of the object that will live at `destination`.
    ///
    /// An empty destination is refused before any network call is made.
    async fn fetch(&self, url: &str, destination: &str) -> Result<FetchedImage>;
}

/// Fetcher backed by a shared `reqwest` client.
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    /// Create a fetcher with a client built from the configuration.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self::with_client(create_async_client(config)?, config.clone()))
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(client: Client, config: FetcherConfig) -> Self {
        Self { client, config }
    }

    fn too_large(&self, url: &str, size: u64) -> AppError {
        AppError::fetch(
            url,
            format!("body of {} bytes exceeds limit of {}", size, self.config.max_bytes),
        )
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &str) -> Result<FetchedImage> {
        if destination.trim().is_empty() {
            return Err(AppError::validation("no destination key given"));
        }
        if !is_http_scheme(url) {
            return Err(AppError::validation(format!(
                "source {url:?} is not an http(s) URL"
            )));
        }
        let parsed = Url::parse(url)
            .map_err(|e| AppError::validation(format!("source URL {url:?} is malformed: {e}")))?;

        tracing::debug!(url, destination, "fetching source image");

        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| AppError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(url, format!("got status {status}")));
        }

        if let Some(length) = response.content_length() {
            if length > self.config.max_bytes {
                return Err(self.too_large(url, length));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(normalize_content_type);
        let allowed = content_type
            .as_deref()
            .is_some_and(|ct| is_allowed_content_type(ct, &self.config.allowed_content_types));

        if !allowed {
            match self.config.content_type_policy {
                ContentTypePolicy::Reject => {
                    return Err(AppError::UnsupportedContentType {
                        url: url.to_string(),
                        content_type: content_type.unwrap_or_default(),
                    });
                }
                ContentTypePolicy::Record => {
                    tracing::warn!(
                        url,
                        content_type = content_type.as_deref().unwrap_or("<none>"),
                        "content type not in allow-list, storing anyway"
                    );
                }
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::fetch(url, format!("could not read body: {e}")))?
        {
            let size = (body.len() + chunk.len()) as u64;
            if size > self.config.max_bytes {
                return Err(self.too_large(url, size));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(url, bytes = body.len(), "fetched source image");

        Ok(FetchedImage {
            bytes: body.freeze(),
            content_type,
            allowed,
        })
    }
}
