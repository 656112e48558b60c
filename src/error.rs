/// Error types
/// Thumbnail generation, request serving and startup configuration

use std::path::PathBuf;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Thumbnail generation failure.
///
/// `Clone` because a single outcome is handed to every request waiting on the same key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThumbnailError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("frame extraction tool unavailable: {0}")]
    ExternalToolUnavailable(String),
    #[error("frame extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),
    #[error("source file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("thumbnail task failed: {0}")]
    Internal(String),
}

impl ThumbnailError {
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io(err.to_string()),
        }
    }

    /// Whether a later request for the same file could succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ExtractionTimeout(_) | Self::Io(_) | Self::Internal(_))
    }
}

impl From<image::ImageError> for ThumbnailError {
    fn from(err: image::ImageError) -> Self {
        use image::ImageError;
        match err {
            // truncated or garbled data surfaces as an i/o error from some decoders
            ImageError::IoError(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData
                ) =>
            {
                Self::UnsupportedFormat(e.to_string())
            }
            ImageError::IoError(e) => Self::Io(e.to_string()),
            other => Self::UnsupportedFormat(other.to_string()),
        }
    }
}

/// Request-level failure, mapped straight onto an HTTP status.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("access denied")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
                std::io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("[DISPATCH] {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Startup configuration failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("path does not exist: {}", .0.display())]
    RootMissing(PathBuf),
    #[error("path is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),
    #[error("{0}")]
    Invalid(String),
}
