use mailbrief_core::{ErrorCode, ServiceError};
use thiserror::Error;

/// Errors raised by mailbox operations.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// Refresh token expired or revoked; the run must abort and ask the
    /// user to re-authorize.
    #[error("mailbox authorization invalid: {0}")]
    AuthInvalid(String),

    /// Bad request input (historical window, malformed dates).
    #[error("invalid mailbox request: {0}")]
    Validation(String),

    #[error("mailbox rate limited: {0}")]
    RateLimited(String),

    #[error("mailbox network error: {0}")]
    Network(String),

    /// Non-auth, non-429 API failure.
    #[error("mailbox API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A message body that could not be decoded.
    #[error("mailbox decode error: {0}")]
    Decode(String),
}

impl ServiceError for MailboxError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::AuthInvalid(_) => ErrorCode::AuthInvalid,
            Self::Validation(_) => ErrorCode::Validation,
            Self::RateLimited(_) => ErrorCode::RateLimited,
            Self::Network(_) | Self::Api { .. } => ErrorCode::TransientNetwork,
            Self::Decode(_) => ErrorCode::Fatal,
        }
    }
}

impl MailboxError {
    /// Map an HTTP status + body into the right variant.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::AuthInvalid(message),
            429 => Self::RateLimited(message),
            _ => Self::Api { status, message },
        }
    }
}
