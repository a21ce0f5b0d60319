//! API error types.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vgen_models::{FailureKind, GenerationFailure, RequestError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Malformed request body: {0}")]
    Payload(#[from] JsonRejection),

    #[error(transparent)]
    Validation(#[from] RequestError),

    #[error("{}", .0.reason)]
    Generation(GenerationFailure),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Payload(rejection) => rejection.status(),
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Generation(failure) => match failure.kind {
                FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                FailureKind::Environment | FailureKind::Encode => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Short summary shown as `error`.
    fn summary(&self) -> &'static str {
        match self {
            ApiError::Payload(_) | ApiError::Validation(_) => "Invalid request",
            ApiError::Generation(failure) => match failure.kind {
                FailureKind::Environment => "Server configuration error",
                FailureKind::Encode => "Error generating video",
                FailureKind::Timeout => "Video generation timed out",
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Payload(_) => "payload",
            ApiError::Validation(_) => "validation",
            ApiError::Generation(failure) => failure.kind.as_str(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    logs: Option<String>,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = ErrorResponse {
            error: self.summary(),
            details: self.to_string(),
            kind: self.kind(),
            logs: match self {
                ApiError::Generation(failure) if !failure.log.is_empty() => Some(failure.log),
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}
