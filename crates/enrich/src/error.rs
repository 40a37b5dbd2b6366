use mailbrief_core::{ErrorCode, ServiceError};
use thiserror::Error;

/// Errors raised by the extraction and search clients.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("enrichment HTTP error: {0}")]
    Network(String),

    #[error("enrichment rate limited: {0}")]
    RateLimited(String),

    #[error("enrichment API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("enrichment response parse error: {0}")]
    Parse(String),

    #[error("enrichment configuration error: {0}")]
    Configuration(String),
}

impl EnrichError {
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        if status == 429 {
            Self::RateLimited(message)
        } else {
            Self::Api { status, message }
        }
    }
}

impl ServiceError for EnrichError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::RateLimited(_) => ErrorCode::RateLimited,
            Self::Network(_) => ErrorCode::TransientNetwork,
            Self::Api { status, .. } if *status >= 500 => ErrorCode::TransientNetwork,
            Self::Api { .. } | Self::Parse(_) | Self::Configuration(_) => ErrorCode::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            EnrichError::from_status(429, String::new()),
            EnrichError::RateLimited(_)
        ));
        assert!(matches!(
            EnrichError::from_status(500, String::new()),
            EnrichError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn retryability() {
        assert!(EnrichError::Network("reset".into()).error_code().is_retryable());
        assert!(
            !EnrichError::Parse("bad".into())
                .error_code()
                .is_retryable()
        );
    }
}
