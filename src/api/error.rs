use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::CoordinatorError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl CoordinatorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoordinatorError::TaskNotFound(_) | CoordinatorError::NodeNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CoordinatorError::Forbidden { .. } => StatusCode::FORBIDDEN,
            CoordinatorError::InvalidTransition { .. }
            | CoordinatorError::NodeUnavailable { .. } => StatusCode::CONFLICT,
            CoordinatorError::NoWorkAvailable => StatusCode::NO_CONTENT,
            CoordinatorError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoordinatorError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Map an axum extractor rejection (bad JSON, bad path segment) onto the
/// taxonomy.
pub(crate) fn malformed(rejection: impl std::fmt::Display) -> CoordinatorError {
    CoordinatorError::MalformedInput(rejection.to_string())
}
