// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::validation::ValidationError;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Meeting not found: {0}")]
    MeetingNotFound(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Outbound queue full for connection {0}")]
    OutboundFull(uuid::Uuid),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MeetingNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::Io(_) | AppError::OutboundFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "INT_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::MeetingNotFound(_) => "MEET_001",
            AppError::Validation(_) => "VAL_001",
            AppError::RateLimitExceeded => "RATE_001",
            AppError::OutboundFull(_) => "WS_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            AppError::Io(_) => "Storage temporarily unavailable".to_string(),
            AppError::Json(_) => "Invalid data format".to_string(),
            AppError::MeetingNotFound(_) => "Meeting not found".to_string(),
            // validation messages only echo the offending field, never stored data
            AppError::Validation(e) => e.to_string(),
            AppError::RateLimitExceeded => {
                "Rate limit exceeded, please try again later".to_string()
            },
            AppError::OutboundFull(_) => "Connection is not reading its events".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::Internal("Meeting actor is no longer running".to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for AppError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        AppError::Internal("Meeting actor dropped the response".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_app_error_display() {
        let not_found = AppError::MeetingNotFound("R1".to_string());
        assert_eq!(not_found.to_string(), "Meeting not found: R1");

        let io_error = AppError::Io(IoError::new(ErrorKind::NotFound, "File not found"));
        assert!(io_error.to_string().contains("IO error"));

        assert_eq!(AppError::RateLimitExceeded.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::MeetingNotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation(ValidationError::MissingField("roomId")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Io(IoError::other("disk full")).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        assert_eq!(AppError::Json(json_err).error_code(), "JSON_001");
        assert_eq!(AppError::OutboundFull(uuid::Uuid::nil()).error_code(), "WS_001");
        assert_eq!(AppError::MeetingNotFound("x".to_string()).error_code(), "MEET_001");
    }

    #[tokio::test]
    async fn test_error_into_response() {
        let response = AppError::MeetingNotFound("R9".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("application/json"));
    }
}
