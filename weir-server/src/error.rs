//! HTTP error mapping.
//!
//! Domain errors are translated by [`WeirError::kind`]; internal failures
//! are logged and answered with a generic body.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use weir_core::{ErrorKind, WeirError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] WeirError),

    /// Malformed path, query, or body.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Domain(err) => status_for(err),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

pub fn status_for(err: &WeirError) -> StatusCode {
    match err.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::BusinessRule if *err == WeirError::VersionNotReady => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::BusinessRule => StatusCode::BAD_REQUEST,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "internal server error".to_string()
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&WeirError::TrafficConfigNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&WeirError::CanaryAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_for(&WeirError::WeightSumExceeds100), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&WeirError::CannotDeleteStable), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&WeirError::VersionNotReady),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&WeirError::AiGatewayNotAvailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(&WeirError::Cancelled), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            status_for(&WeirError::repository("disk I/O error")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response = ApiError::from(WeirError::repository("database is locked")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "internal server error");
    }
}
