//! Serving handles: public, time-bounded URLs for stored objects.
//!
//! A handle never exposes the object store. It resolves to a storage key only
//! while it is live, and revoking it takes effect immediately.

mod resize;
mod signed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ServingOptions, StorageKey};

pub use resize::fit_within;
pub use signed::SignedHandleService;

/// Path prefix under which handles are served.
pub const SERVE_PATH: &str = "/serve";

/// A live handle looked up by its URL or token.
///
/// `size` is the display bound the handle was minted with; served bytes are
/// scaled to fit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHandle {
    pub key: StorageKey,
    pub size: u32,
    pub expires_at: DateTime<Utc>,
}

/// Mints and revokes serving URLs bound to object store keys.
#[async_trait]
pub trait ServingHandles: Send + Sync {
    /// Mint a serving URL for the object at `key`.
    ///
    /// Fails with `NotFound` if no object is stored at `key`. Minting again
    /// for the same key replaces the previous handle.
    async fn mint(&self, key: &StorageKey, options: &ServingOptions) -> Result<String>;

    /// Revoke the handle bound to `key`. A missing handle counts as revoked.
    async fn revoke(&self, key: &StorageKey) -> Result<()>;

    /// Look up a handle by full URL, `token=s<size>` segment, or bare token.
    async fn resolve(&self, handle: &str) -> Result<Option<ResolvedHandle>>;
}

/// Extract the token from a serving URL or path segment.
///
/// `https://host/serve/ab12=s450` and `ab12=s450` both give `ab12`.
pub fn handle_token(handle: &str) -> Option<&str> {
    let segment = handle
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let token = segment.split('=').next().unwrap_or_default();
    if token.is_empty() { None } else { Some(token) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_token() {
        assert_eq!(handle_token("https://img.test/serve/ab12=s450"), Some("ab12"));
        assert_eq!(handle_token("ab12=s450"), Some("ab12"));
        assert_eq!(handle_token("ab12"), Some("ab12"));
        assert_eq!(handle_token("https://img.test/serve/ab12=s450?x=1"), Some("ab12"));
        assert_eq!(handle_token(""), None);
        assert_eq!(handle_token("https://img.test/serve/=s450"), None);
    }
}
