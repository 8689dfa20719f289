// src/logging.rs

//! Log output setup for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to whoever runs it.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{AppError, Result};

/// Install the global subscriber. `RUST_LOG` overrides `level` when set.
pub fn init(level: &str, json: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| AppError::config(format!("invalid log level {level:?}: {e}")))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    result.map_err(|e| AppError::config(format!("logging already initialised: {e}")))
}
