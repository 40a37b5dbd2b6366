use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::client::{ChatClient, ChatRequest};
use crate::config::LlmConfig;
use crate::error::LlmError;

/// HTTP chat-completion client against an OpenAI-compatible API.
#[derive(Debug)]
pub struct OpenAiClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut body = json!({
            "model": request.tier.model(),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        debug!(model = request.tier.model(), json_mode = request.json_mode, "sending chat completion");

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout_seconds)
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "LLM API returned error");
            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited(body));
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("failed to parse API response: {e}")))?;

        // Chat-completions response shape: choices[0].message.content.
        response_json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(ToOwned::to_owned)
            .ok_or_else(|| LlmError::Parse(format!("unexpected response format: {response_json}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::ModelTier;

    #[test]
    fn client_builds_from_config() {
        let config = LlmConfig::new("http://localhost:9/v1/chat/completions", "sk-test");
        assert!(OpenAiClient::new(config).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let config =
            LlmConfig::new("http://127.0.0.1:1/v1/chat/completions", "sk-test").with_timeout(1);
        let client = OpenAiClient::new(config).unwrap();
        let request = ChatRequest::json(ModelTier::Mini, "s", "u");
        let err = client.complete(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::Http(_) | LlmError::Timeout(_)));
    }
}
