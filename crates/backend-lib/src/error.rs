// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use warden_common::{ErrorBody, ErrorDetail};

use crate::validation::ValidationErrors;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    /// Field-scoped validation failures; the save was blocked
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Credentials or remember-token did not authenticate
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("User not found")]
    UserNotFound,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::UserNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VAL_001",
            AppError::NotAuthenticated => "AUTH_001",
            AppError::UserNotFound => "NF_001",
            AppError::Storage(_) => "STORE_001",
            AppError::Hashing(_) => "HASH_001",
            AppError::Config(_) => "CFG_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Validation failed".to_string(),
            AppError::NotAuthenticated => "Authentication failed".to_string(),
            AppError::UserNotFound => "Resource not found".to_string(),
            AppError::Storage(_)
            | AppError::Hashing(_)
            | AppError::Config(_)
            | AppError::Io(_)
            | AppError::Json(_) => "An internal server error occurred".to_string(),
        }
    }

    /// Field errors, when this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            AppError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    fn body(&self) -> ErrorBody {
        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        ErrorBody {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message,
                fields: self.validation_errors().map(ValidationErrors::to_map),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        (self.status_code(), axum::Json(self.body())).into_response()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}
