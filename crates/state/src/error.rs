use mailbrief_core::{ErrorCode, ServiceError};
use thiserror::Error;

/// Errors surfaced by store backends.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backing store failed (I/O, connection, capacity).
    #[error("state backend error: {0}")]
    Backend(String),

    /// A stored value could not be serialized or deserialized.
    #[error("state serialization error: {0}")]
    Serialization(String),
}

impl ServiceError for StateError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Backend(_) => ErrorCode::TransientNetwork,
            Self::Serialization(_) => ErrorCode::Fatal,
        }
    }
}
