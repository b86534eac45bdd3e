use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Structured error type for the application surface (CLI, future UI bridge).
/// Serialised with a `code` tag so a frontend can match on error codes and
/// display appropriate UI.
#[derive(Debug, Clone, Error, Serialize, TS)]
#[serde(tag = "code", content = "detail")]
#[ts(export)]
pub enum AppError {
    #[error("{message}")]
    ValidationError { message: String },
    #[error("I/O error: {message}")]
    IoError { message: String },
    #[error("API error: {message}")]
    ApiError { message: String },
    #[error("Failed to save settings: {message}")]
    SettingsSaveError { message: String },
    #[error("A turn is already in progress")]
    TurnInProgress,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("No API key configured. Set it with `glasscard config --api-key`.")]
    NoApiKey,
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<crate::storage::StorageError> for AppError {
    fn from(e: crate::storage::StorageError) -> Self {
        match e {
            crate::storage::StorageError::Io(io_err) => AppError::IoError {
                message: io_err.to_string(),
            },
            crate::storage::StorageError::Json(json_err) => AppError::ValidationError {
                message: json_err.to_string(),
            },
        }
    }
}

impl From<crate::validate::ValidationFailure> for AppError {
    fn from(e: crate::validate::ValidationFailure) -> Self {
        AppError::ValidationError {
            message: e.to_string(),
        }
    }
}

impl From<crate::transport::TransportError> for AppError {
    fn from(e: crate::transport::TransportError) -> Self {
        AppError::ApiError {
            message: e.to_string(),
        }
    }
}

impl From<crate::chat::TurnRejected> for AppError {
    fn from(e: crate::chat::TurnRejected) -> Self {
        match e {
            crate::chat::TurnRejected::EmptyInput => AppError::EmptyMessage,
            crate::chat::TurnRejected::Busy => AppError::TurnInProgress,
        }
    }
}

/// Allow converting AppError to String for plain-text surfaces.
impl From<AppError> for String {
    fn from(e: AppError) -> String {
        e.to_string()
    }
}
