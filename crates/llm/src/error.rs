use mailbrief_core::{ErrorCode, ServiceError};
use thiserror::Error;

/// Errors raised by chat-completion calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport failed.
    #[error("LLM HTTP error: {0}")]
    Http(String),

    /// Request timed out.
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    /// Upstream returned 429.
    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    /// Upstream returned a non-success status.
    #[error("LLM API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response did not contain parseable content.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// Client misconfiguration.
    #[error("LLM configuration error: {0}")]
    Configuration(String),
}

impl ServiceError for LlmError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::RateLimited(_) => ErrorCode::RateLimited,
            Self::Http(_) | Self::Timeout(_) => ErrorCode::TransientNetwork,
            Self::Api { status, .. } if *status >= 500 => ErrorCode::TransientNetwork,
            Self::Api { .. } | Self::Configuration(_) => ErrorCode::Fatal,
            Self::Parse(_) => ErrorCode::LlmResponseInvalid,
        }
    }
}
