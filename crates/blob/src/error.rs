use mailbrief_core::{ErrorCode, ServiceError};
use thiserror::Error;

/// Errors surfaced by blob backends.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Keys must be relative, non-empty, and free of `..` components.
    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("blob I/O error: {0}")]
    Io(String),

    #[error("blob backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl ServiceError for BlobError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidKey(_) => ErrorCode::Validation,
            Self::Io(_) | Self::Backend(_) => ErrorCode::TransientNetwork,
        }
    }
}
