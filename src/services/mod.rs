//! Service layer for the ingestion pipeline.
//!
//! - Source fetching (`HttpFetcher`)

mod fetcher;

pub use fetcher::{Fetcher, HttpFetcher};
