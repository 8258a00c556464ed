use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("File system error: {0}")]
    FileSystemError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WardenError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WardenError::InvalidPolicy(_) => StatusCode::BAD_REQUEST,
            WardenError::UnknownPolicy(_) => StatusCode::NOT_FOUND,
            WardenError::ConfigurationError(_)
            | WardenError::FileSystemError(_)
            | WardenError::JsonError(_)
            | WardenError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WardenError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Result type alias for warden operations
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            WardenError::UnknownPolicy("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WardenError::InvalidPolicy("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WardenError::ConfigurationError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_io_error_converts() {
        let err: WardenError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, WardenError::FileSystemError(_)));
        assert_eq!(err.to_string(), "File system error: gone");
    }
}
