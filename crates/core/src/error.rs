use serde::{Deserialize, Serialize};

use crate::envelope::Stage;

/// Classified failure cause for a pipeline stage.
///
/// The retryable split drives the orchestrator's retry policy; everything
/// else routes to the error handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Mailbox token expired or revoked; triggers a re-auth notification.
    AuthInvalid,
    /// Bad historical dates or missing required fields.
    Validation,
    /// The cost tracker refused a call.
    BudgetExceeded,
    /// A circuit breaker is open for the target dependency.
    CircuitOpen,
    /// Upstream returned 429.
    RateLimited,
    TransientNetwork,
    /// The LLM answered with something that does not parse.
    LlmResponseInvalid,
    /// The digest email could not be delivered.
    DeliveryFailed,
    /// Unexpected failure; surfaces the full message via the error notice.
    Fatal,
}

impl ErrorCode {
    /// Whether the orchestrator should retry a stage failing with this code.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::CircuitOpen | Self::RateLimited | Self::TransientNetwork | Self::LlmResponseInvalid
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthInvalid => "auth_invalid",
            Self::Validation => "validation",
            Self::BudgetExceeded => "budget_exceeded",
            Self::CircuitOpen => "circuit_open",
            Self::RateLimited => "rate_limited",
            Self::TransientNetwork => "transient_network",
            Self::LlmResponseInvalid => "llm_response_invalid",
            Self::DeliveryFailed => "delivery_failed",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by a stage handler, carried in the pipeline envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineError {
    pub code: ErrorCode,
    pub stage: Stage,
    pub timestamp_ms: i64,
    pub retryable: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl PipelineError {
    /// Build an error; `retryable` is derived from the code.
    #[must_use]
    pub fn new(code: ErrorCode, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            code,
            stage,
            timestamp_ms: crate::now_ms(),
            retryable: code.is_retryable(),
            message: message.into(),
            details: None,
        }
    }

    /// Wrap a service error, mapping its classification into a code.
    #[must_use]
    pub fn from_service<E: ServiceError>(stage: Stage, err: &E) -> Self {
        Self::new(err.error_code(), stage, err.to_string())
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error in {} stage: {}", self.code, self.stage, self.message)
    }
}

impl std::error::Error for PipelineError {}

/// Implemented by every client/store error so stages can classify failures
/// uniformly.
pub trait ServiceError: std::error::Error {
    /// Map this error into the pipeline taxonomy.
    fn error_code(&self) -> ErrorCode;
}
