/// Configuration for the HTTP chat-completion client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint, e.g. `https://api.openai.com/v1/chat/completions`.
    pub endpoint: String,
    /// API key for authentication.
    pub api_key: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl LlmConfig {
    /// Create a config with a 60 s timeout.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout_seconds: 60,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LlmConfig::new("https://api.openai.com/v1/chat/completions", "sk-test");
        assert_eq!(config.timeout_seconds, 60);
    }

    #[test]
    fn builder() {
        let config = LlmConfig::new("http://localhost/v1/chat/completions", "sk-test")
            .with_timeout(15);
        assert_eq!(config.timeout_seconds, 15);
    }
}
