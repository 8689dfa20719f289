//! Route handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::app::App;
use crate::error::AppError;
use crate::models::is_http_scheme;
use crate::pipeline::{Delivery, DispatchOutcome};
use crate::queue::RedeliveryMarker;
use crate::serving::fit_within;
use crate::server::{ApiError, REDELIVERY_HEADER};

type ApiResult = std::result::Result<Response, ApiError>;

/// Query string shared by the serving URL routes.
#[derive(Debug, Default, Deserialize)]
pub struct ServingUrlQuery {
    #[serde(rename = "productID", default)]
    pub product_id: String,
    #[serde(rename = "externalImageURL", default)]
    pub external_image_url: String,
}

impl ServingUrlQuery {
    fn require_source(&self) -> Result<(), AppError> {
        if self.product_id.trim().is_empty() {
            return Err(AppError::validation("productID is required"));
        }
        if self.external_image_url.trim().is_empty() {
            return Err(AppError::validation("externalImageURL is required"));
        }
        Ok(())
    }
}

fn outcome_response(outcome: DispatchOutcome) -> Response {
    match outcome {
        DispatchOutcome::Scheduled { .. } => (StatusCode::ACCEPTED, Json(outcome)).into_response(),
        DispatchOutcome::Completed { serving_url } => serving_url.into_response(),
    }
}

/// `GET /servingURL`: schedule a fetch, or re-mint for a stored key.
pub async fn get_serving_url(
    State(app): State<Arc<App>>,
    Query(query): Query<ServingUrlQuery>,
) -> ApiResult {
    query.require_source()?;

    if is_http_scheme(&query.external_image_url) {
        let outcome = app
            .dispatcher
            .dispatch(&query.product_id, &query.external_image_url, Delivery::External)
            .await?;
        return Ok(outcome_response(outcome));
    }

    let serving_url = app
        .ingest
        .ingest(&query.product_id, &query.external_image_url)
        .await?;
    Ok(serving_url.into_response())
}

/// `DELETE /servingURL`
pub async fn delete_serving_url(
    State(app): State<Arc<App>>,
    Query(query): Query<ServingUrlQuery>,
) -> ApiResult {
    if query.product_id.trim().is_empty() {
        return Err(AppError::validation("productID is required").into());
    }
    app.delete.delete(&query.product_id).await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /servingURLExternal`: redelivery from a remote queue.
pub async fn redelivered_serving_url(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Query(query): Query<ServingUrlQuery>,
) -> ApiResult {
    let token = headers
        .get(REDELIVERY_HEADER)
        .and_then(|value| value.to_str().ok());
    let marker =
        RedeliveryMarker::verify(token, &app.config.queue).ok_or(ApiError::Forbidden)?;

    query.require_source()?;
    let outcome = app
        .dispatcher
        .dispatch(
            &query.product_id,
            &query.external_image_url,
            Delivery::Redelivery(marker),
        )
        .await?;
    Ok(outcome_response(outcome))
}

/// `GET /serve/{handle}`: the bytes behind a live handle, scaled to its size.
pub async fn serve_image(State(app): State<Arc<App>>, Path(handle): Path<String>) -> ApiResult {
    let resolved = app
        .adapters
        .handles
        .resolve(&handle)
        .await?
        .ok_or_else(|| AppError::not_found("serving handle"))?;

    let object = app
        .adapters
        .objects
        .get(&resolved.key)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no stored object at {}", resolved.key)))?;

    let size = resolved.size;
    let object = tokio::task::spawn_blocking(move || fit_within(object, size))
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))??;

    Ok((
        [
            (header::CONTENT_TYPE, object.content_type),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        object.bytes,
    )
        .into_response())
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}
