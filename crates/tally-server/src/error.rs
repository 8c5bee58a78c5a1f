//! HTTP error mapping

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tally_storage::StoreError;
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned to HTTP clients as `{"detail": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-range input
    #[error("{0}")]
    Validation(String),

    /// The `X-API-Key` header was not sent
    #[error("Missing X-API-Key header")]
    MissingApiKey,

    /// The `X-API-Key` header did not match
    #[error("Invalid API Key")]
    InvalidApiKey,

    /// Updates kept colliding after every retry
    #[error("Service busy, please retry")]
    Busy(String),

    /// Storage or runtime failure; details stay in the server log
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MissingApiKey => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidApiKey => StatusCode::UNAUTHORIZED,
            Self::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(cause) => error!(%cause, "Request failed"),
            Self::Busy(cause) => warn!(%cause, "Update abandoned after retries"),
            _ => {}
        }

        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidArgument(msg) => ApiError::Validation(msg),
            StoreError::ConcurrencyConflict(msg) => ApiError::Busy(msg),
            other @ (StoreError::Unavailable(_) | StoreError::Corrupted(_)) => {
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::MissingApiKey.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::InvalidApiKey.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Busy("x".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_store_error_mapping() {
        let err: ApiError = StoreError::InvalidArgument("page must be >= 1".into()).into();
        assert!(matches!(err, ApiError::Validation(ref m) if m == "page must be >= 1"));

        let err: ApiError = StoreError::conflict("lost race").into();
        assert!(matches!(err, ApiError::Busy(_)));

        let err: ApiError = StoreError::unavailable("disk gone").into();
        assert!(matches!(err, ApiError::Internal(_)));
        // storage details are not echoed to clients
        assert_eq!(err.to_string(), "Internal server error");
    }
}
