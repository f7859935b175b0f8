//! HTTP edge error mapping: `cyxcloud_core::CoordinatorError` → status code
//! and `{status: "error", message}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use cyxcloud_core::CoordinatorError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub status: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

pub struct ApiErrorResponse(pub StatusCode, pub ApiError);

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<CoordinatorError> for ApiErrorResponse {
    fn from(err: CoordinatorError) -> Self {
        let status = match &err {
            CoordinatorError::FileNotFound(_) | CoordinatorError::NodeNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CoordinatorError::NoCapacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CoordinatorError::DataUnavailable { .. } => StatusCode::CONFLICT,
            CoordinatorError::Validation(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::TransientNode { .. } => StatusCode::BAD_GATEWAY,
            CoordinatorError::Persistence(_)
            | CoordinatorError::Io(_)
            | CoordinatorError::Serialization(_)
            | CoordinatorError::Configuration(_)
            | CoordinatorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiErrorResponse(status, ApiError::new(err.to_string()))
    }
}
