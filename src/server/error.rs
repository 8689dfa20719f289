//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::AppError;

/// Error returned by route handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Redelivery endpoint called without a valid token
    Forbidden,
    App(AppError),
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        Self::App(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::App(err) if err.is_missing_object() => StatusCode::NOT_FOUND,
            Self::App(err) => match err {
                AppError::Validation(_) => StatusCode::BAD_REQUEST,
                AppError::NotFound(_) => StatusCode::NOT_FOUND,
                AppError::FetchFailed { .. } | AppError::UnsupportedContentType { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                AppError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Forbidden => "redelivery token missing or invalid".to_string(),
            Self::App(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", message);
        } else {
            tracing::debug!(status = status.as_u16(), "{}", message);
        }

        let body = json!({
            "code": status.as_u16(),
            "name": status.canonical_reason().unwrap_or("Error"),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |e: AppError| ApiError::from(e).status();

        assert_eq!(status(AppError::validation("no id")), StatusCode::BAD_REQUEST);
        assert_eq!(status(AppError::not_found("product-images/42")), StatusCode::NOT_FOUND);
        assert_eq!(status(AppError::fetch("https://x.test/a.png", "got status 500")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status(AppError::DeadlineExceeded { operation: "ingest".into(), secs: 60 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(status(AppError::missing_object("product-images/42")), StatusCode::NOT_FOUND);
        assert_eq!(status(AppError::handle_creation("k", "io")), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(AppError::persist("k", "disk full")), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(AppError::enqueue("42", "queue is full")), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
    }
}
