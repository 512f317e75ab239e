//! Error types for the multipart relay

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StoreOperation;

/// Errors surfaced by the upload orchestrator
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Upload not found: {0}")]
    SessionNotFound(String),

    #[error("Not all parts have been uploaded: received {received} of {expected}")]
    IncompletePartSet { received: usize, expected: u32 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),
}

/// Failures reported by a multipart store backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: StoreOperation,
        after: Duration,
    },

    #[error("S3 SDK error during {operation}: {message}")]
    Sdk {
        operation: StoreOperation,
        message: String,
    },

    #[error("Store response for {operation} is missing {field}")]
    MissingField {
        operation: StoreOperation,
        field: &'static str,
    },

    #[error("Store rejected {operation}: {reason}")]
    Rejected {
        operation: StoreOperation,
        reason: String,
    },

    #[error("Store issued upload id {0} twice")]
    DuplicateUploadId(String),
}

impl StorageError {
    pub fn sdk(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::Sdk {
            operation,
            message: message.into(),
        }
    }

    pub fn rejected(operation: StoreOperation, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            reason: reason.into(),
        }
    }
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::IncompletePartSet { .. } => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::IncompletePartSet { .. } => "INCOMPLETE_PART_SET",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            UploadError::StoreUnavailable(e) => {
                tracing::error!(error = %e, "Store call failed");
                "Storage backend unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: message,
            code: self.code(),
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
