//! JSON error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::playlist::ImportError;
use crate::security::AuthError;
use crate::sessions::DispatchError;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// A handler failure with its HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: ErrorDetail {
                    code: self.code,
                    message: self.message,
                },
            }),
        )
            .into_response()
    }
}

impl From<crate::Error> for ApiError {
    fn from(e: crate::Error) -> Self {
        match e {
            crate::Error::Conflict(msg) => Self::new(StatusCode::CONFLICT, "conflict", msg),
            other => {
                tracing::error!(error = %other, "store operation failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "db_error", "database error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::KeyUnavailable(err) => {
                tracing::error!(error = %err, "signing keys unavailable");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "failed to fetch signing keys",
                )
            }
            AuthError::Store(err) => {
                tracing::error!(error = %err, "failed to resolve user");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "db_error",
                    "failed to resolve user",
                )
            }
            other => {
                tracing::warn!(error = %other, "rejected credentials");
                Self::new(StatusCode::UNAUTHORIZED, "unauthorized", other.to_string())
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NotConnected(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "not_connected",
                "device not connected",
            ),
            DispatchError::Disconnected(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "not_connected",
                e.to_string(),
            ),
            DispatchError::TimedOut(_) => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "timeout", e.to_string())
            }
            DispatchError::StreamingUnsupported(_) | DispatchError::EncodingFailed(_) => {
                tracing::error!(error = %e, "command dispatch failed");
                Self::internal("failed to send command")
            }
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Store(err) => {
                tracing::error!(error = %err, "failed to save channels");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "db_error",
                    "failed to save channels",
                )
            }
            other => Self::bad_request(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_shape() {
        let body = serde_json::to_value(ErrorResponse {
            error: ErrorDetail {
                code: "not_found",
                message: "device not found".to_string(),
            },
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({"error": {"code": "not_found", "message": "device not found"}})
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::from(DispatchError::NotConnected("tv".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(AuthError::MissingCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(crate::Error::Conflict("taken".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ImportError::Empty).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(crate::Error::Database("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
