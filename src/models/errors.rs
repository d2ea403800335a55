use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    ValidationError { message: String },

    #[error("Invalid : Resources not found: {id}")]
    InvalidId { id: String },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("{message}")]
    Forbidden { message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("{message}")]
    UnsupportedMediaType { message: String },

    #[error("{message}")]
    PayloadTooLarge { message: String },

    #[error("{message}")]
    UploadError { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

/// JSON body sent for every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    /// HTTP status code this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidId { .. } | AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UploadError { .. }
            | AppError::StorageError { .. }
            | AppError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts the error into the wire representation
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            message: self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self);
        } else {
            tracing::debug!("Request rejected with {}: {}", status, self);
        }

        (status, Json(self.to_response())).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::not_found("Resource not found"),
            other => AppError::storage_failed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::storage_failed(format!("Migration failed: {}", err))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::internal_error(format!("Password hashing failed: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::internal_error(format!("Token error: {}", err))
    }
}

impl From<multer::Error> for AppError {
    fn from(err: multer::Error) -> Self {
        match err {
            multer::Error::FieldSizeExceeded { limit, field_name } => {
                tracing::debug!("Multipart field {:?} exceeded {} bytes", field_name, limit);
                AppError::payload_too_large(format!("File size exceeds maximum of {} bytes", limit))
            }
            multer::Error::StreamSizeExceeded { limit } => AppError::payload_too_large(format!(
                "Request body exceeds maximum of {} bytes",
                limit
            )),
            other => {
                AppError::validation_failed(format!("Failed to parse multipart data: {}", other))
            }
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::upload_failed(format!("Image host request failed: {}", err))
    }
}

// Convenience functions for creating specific errors
impl AppError {
    pub fn validation_failed(message: impl Into<String>) -> Self {
        AppError::ValidationError { message: message.into() }
    }

    pub fn invalid_id(id: impl Into<String>) -> Self {
        AppError::InvalidId { id: id.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized { message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict { message: message.into() }
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        AppError::UnsupportedMediaType { message: message.into() }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        AppError::PayloadTooLarge { message: message.into() }
    }

    pub fn upload_failed(message: impl Into<String>) -> Self {
        AppError::UploadError { message: message.into() }
    }

    pub fn storage_failed(message: impl Into<String>) -> Self {
        AppError::StorageError { message: message.into() }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        AppError::InternalError { message: message.into() }
    }
}
