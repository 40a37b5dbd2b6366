use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::backend::{MailBackend, OutboundEmail, SendReceipt};
use crate::error::MailerError;

/// Configuration for the Resend-style HTTP delivery backend.
#[derive(Debug, Clone)]
pub struct ResendConfig {
    /// API base, e.g. `https://api.resend.com`.
    pub api_base: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

impl ResendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: "https://api.resend.com".to_owned(),
            api_key: api_key.into(),
            timeout_seconds: 30,
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

/// HTTP delivery backend for a Resend-style transactional email API.
#[derive(Debug)]
pub struct ResendBackend {
    client: reqwest::Client,
    config: ResendConfig,
}

impl ResendBackend {
    pub fn new(config: ResendConfig) -> Result<Self, MailerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| MailerError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl MailBackend for ResendBackend {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, MailerError> {
        debug!(to = %email.to, subject = %email.subject, "sending email via HTTP API");

        let mut body = json!({
            "from": email.from,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html_body,
        });
        if let Some(ref text) = email.text_body {
            body["text"] = json!(text);
        }

        let response = self
            .client
            .post(format!("{}/emails", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailerError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailerError::Delivery {
                status: Some(status.as_u16()),
                message,
            });
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| MailerError::Delivery {
                status: None,
                message: format!("unreadable send response: {e}"),
            })?;

        info!(to = %email.to, message_id = ?parsed.id, "email accepted by provider");
        Ok(SendReceipt {
            message_id: parsed.id,
            status: "sent".to_owned(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "resend"
    }
}
