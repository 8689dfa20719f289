// src/lib.rs

//! Image ingestion service.
//!
//! Pulls images from third-party hosts into an object store, mints serving
//! URLs for them and keeps each resource's record in sync.

pub mod app;
pub mod error;
#[cfg(feature = "cli")]
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod records;
#[cfg(feature = "server")]
pub mod server;
pub mod serving;
pub mod services;
pub mod storage;
pub mod utils;

pub use app::App;
pub use error::{AppError, Result};
