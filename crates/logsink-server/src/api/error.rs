// ABOUTME: ApiError maps malformed input, oversized results, and storage failures to HTTP responses.
// ABOUTME: Storage failures are logged and answered with 503 so they never look like empty results.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logsink_store::StoreError;
use thiserror::Error;

use crate::api::criteria::CriteriaError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Criteria(#[from] CriteriaError),

    #[error("more logs than requested, {found} with limit {limit}")]
    TooLarge { found: usize, limit: usize },

    #[error("log storage unavailable: {0}")]
    Storage(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Criteria(CriteriaError::UnknownPath(_)) => StatusCode::NOT_FOUND,
            ApiError::Criteria(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Storage(e) = &self {
            tracing::error!("log store operation failed: {}", e);
        } else {
            tracing::debug!("rejecting request with {}: {}", status, self);
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
