use mailbrief_core::{ErrorCode, ServiceError};
use thiserror::Error;

/// Errors raised while rendering or delivering email.
#[derive(Debug, Error)]
pub enum MailerError {
    /// Template rendering failed.
    #[error("render error: {0}")]
    Render(String),

    /// The delivery provider rejected the message.
    #[error("delivery failed{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Delivery {
        status: Option<u16>,
        message: String,
    },

    /// Transport-level failure while talking to the provider.
    #[error("delivery transport error: {0}")]
    Network(String),

    #[error("mailer configuration error: {0}")]
    Configuration(String),
}

impl ServiceError for MailerError {
    fn error_code(&self) -> ErrorCode {
        match self {
            // Any failed send is non-retryable within the Send stage: the
            // run fails, emails stay unmarked, and the next run retries.
            Self::Delivery { .. } | Self::Network(_) => ErrorCode::DeliveryFailed,
            Self::Render(_) | Self::Configuration(_) => ErrorCode::Fatal,
        }
    }
}
