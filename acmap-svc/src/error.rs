//! Error types for acmap-svc
//!
//! Response bodies are flat: `{"error": ..., "details": ...}`, `details` only where
//! there is something to add.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown record id (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Alias already owned by another account (409)
    #[error("Alias '{alias}' already mapped to '{account}'")]
    Conflict { alias: String, account: String },

    /// Store unreachable or failing (503)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<acmap_common::Error> for ApiError {
    fn from(err: acmap_common::Error) -> Self {
        use acmap_common::Error;

        match err {
            Error::Validation(msg) => ApiError::BadRequest(msg),
            Error::NotFound(id) => ApiError::NotFound(id),
            Error::Conflict { alias, account } => ApiError::Conflict { alias, account },
            e if e.is_store_failure() => ApiError::StoreUnavailable(e.to_string()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": "Not found" })),
            ApiError::Conflict { alias, account } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "salesforce_name must be unique",
                    "details": format!(
                        "The salesforce_name '{}' is already mapped to user '{}'.",
                        alias, account
                    ),
                }),
            ),
            ApiError::StoreUnavailable(msg) => {
                error!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": "Store unavailable", "details": msg }),
                )
            }
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error", "details": msg }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_errors_map_to_status() {
        let cases = [
            (
                acmap_common::Error::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                acmap_common::Error::NotFound("x".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                acmap_common::Error::Conflict {
                    alias: "A".into(),
                    account: "B".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                acmap_common::Error::StoreUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                acmap_common::Error::Config("odd".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
