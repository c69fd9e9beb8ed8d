use crate::services::{file_service::GatewayError, object_store::StoreError};
use axum::{
    Json,
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Error returned by every handler; renders as `{error, status, details?}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub details: Vec<String>,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: Vec::new(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// 400 with one entry per failed rule.
    pub fn validation(msg: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            details,
            ..Self::bad_request(msg)
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if !self.details.is_empty() {
            body["details"] = json!(self.details);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BucketNotFound(_) | StoreError::ObjectNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            StoreError::InvalidBucketName { .. }
            | StoreError::InvalidObjectKey(_)
            | StoreError::UnsupportedRegion(_) => {
                AppError::validation("Invalid request", vec![err.to_string()])
            }
            StoreError::Sqlx(_) | StoreError::Io(_) => {
                tracing::error!("backend failure: {}", err);
                AppError::internal(err.to_string())
            }
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(details) => AppError::validation("Validation failed", details),
            GatewayError::FileNotFound(_) => AppError::not_found("File not found"),
            GatewayError::Resolve(err) => AppError::validation("Invalid request", vec![err.to_string()]),
            GatewayError::Store(err) => err.into(),
        }
    }
}

/// Keeps axum's status so a body over the limit reports 413.
impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "Request body too large"
        } else {
            "Malformed multipart body"
        };
        AppError {
            details: vec![err.body_text()],
            ..AppError::new(status, message)
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::validation("Malformed JSON body", vec![err.body_text()])
    }
}
