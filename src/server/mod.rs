// src/server/mod.rs

//! HTTP surface.
//!
//! | Route | Behavior |
//! |---|---|
//! | `GET /servingURL` | schedule ingestion (`202`) or re-mint a stored key (`200`) |
//! | `DELETE /servingURL` | revoke and delete |
//! | `GET /servingURLExternal` | redelivery, requires the `x-redelivery-token` header |
//! | `GET /serve/{handle}` | stored bytes behind a live handle |
//! | `GET /healthz` | liveness |

mod error;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::app::App;
use crate::error::Result;
use crate::models::REDELIVERY_PATH;
use crate::serving::SERVE_PATH;

pub use error::ApiError;
pub use handlers::ServingUrlQuery;

/// Header carrying the shared redelivery token.
pub const REDELIVERY_HEADER: &str = "x-redelivery-token";

/// Build the router over a wired application.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route(
            "/servingURL",
            get(handlers::get_serving_url).delete(handlers::delete_serving_url),
        )
        .route(REDELIVERY_PATH, get(handlers::redelivered_serving_url))
        .route(&format!("{SERVE_PATH}/{{handle}}"), get(handlers::serve_image))
        .route("/healthz", get(handlers::healthz))
        .with_state(app)
}

/// Serve until Ctrl-C.
pub async fn serve(app: Arc<App>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
