use crate::app::AppError;
use crate::infra::storage::StorageError;
use crate::transport::http::types::ApiResponse;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors as the HTTP client sees them.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Logged in full, reported to the client as a generic message.
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(cause) => {
                error!(%cause, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ApiResponse::error(message))).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => ApiError::Validation(msg),
            AppError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            AppError::Conflict(msg) => ApiError::Conflict(msg),
            AppError::Forbidden(msg) => ApiError::Forbidden(msg),
            e @ AppError::PayloadTooLarge(_) => ApiError::PayloadTooLarge(e.to_string()),
            e @ AppError::Unavailable(_) => ApiError::ServiceUnavailable(e.to_string()),
            AppError::Storage(StorageError::NotFound(_)) => ApiError::NotFound("file not found".to_string()),
            AppError::Storage(StorageError::InvalidKey(key)) => {
                ApiError::Validation(format!("invalid storage key '{key}'"))
            }
            e @ (AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_)) => {
                ApiError::Internal(format!("{e:#}"))
            }
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::MissingPathParams(e) => ApiError::Internal(e.body_text()),
            other => ApiError::Validation(format!("invalid path: {}", other.body_text())),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(format!("invalid query string: {}", rejection.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(format!("invalid JSON body: {}", rejection.body_text()))
    }
}

/// `200 {success: true, data}`.
pub fn ok<T: Serialize>(data: T) -> ApiResult<Json<ApiResponse>> {
    let value = serde_json::to_value(data).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ApiResponse::ok(value)))
}

/// `201 {success: true, data}`.
pub fn created<T: Serialize>(data: T) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    Ok((StatusCode::CREATED, ok(data)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (AppError::validation("bad"), StatusCode::BAD_REQUEST),
            (AppError::NotFound("order"), StatusCode::NOT_FOUND),
            (AppError::conflict("dup"), StatusCode::CONFLICT),
            (AppError::forbidden("no"), StatusCode::FORBIDDEN),
            (AppError::PayloadTooLarge(10), StatusCode::PAYLOAD_TOO_LARGE),
            (AppError::Unavailable("stripe"), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Internal(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn not_found_names_the_resource() {
        let err = ApiError::from(AppError::NotFound("license"));
        assert_eq!(err.to_string(), "license not found");
    }
}
