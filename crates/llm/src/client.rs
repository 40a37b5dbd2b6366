use async_trait::async_trait;

use crate::error::LlmError;
use crate::tier::ModelTier;

/// A single chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub tier: ModelTier,
    /// System prompt establishing the task.
    pub system: String,
    /// User content for this call.
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the model for a JSON-object response.
    pub json_mode: bool,
}

impl ChatRequest {
    /// A deterministic JSON-mode request, the pipeline's common case.
    #[must_use]
    pub fn json(tier: ModelTier, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            tier,
            system: system.into(),
            user: user.into(),
            temperature: 0.2,
            max_tokens: 2_048,
            json_mode: true,
        }
    }

    /// A short free-text request.
    #[must_use]
    pub fn text(tier: ModelTier, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            tier,
            system: system.into(),
            user: user.into(),
            temperature: 0.7,
            max_tokens: 512,
            json_mode: false,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Trait for chat-completion backends.
#[async_trait]
pub trait ChatClient: Send + Sync + std::fmt::Debug {
    /// Execute a completion and return the assistant message content.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_requests_are_deterministic() {
        let req = ChatRequest::json(ModelTier::Quality, "system", "user");
        assert!(req.json_mode);
        assert!(req.temperature < 0.5);
    }

    #[test]
    fn text_requests_are_not_json_mode() {
        let req = ChatRequest::text(ModelTier::Mini, "system", "user").with_max_tokens(128);
        assert!(!req.json_mode);
        assert_eq!(req.max_tokens, 128);
    }
}
