use async_trait::async_trait;

use crate::error::MailerError;

/// A fully rendered outbound email.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    /// Optional plain-text alternative.
    pub text_body: Option<String>,
}

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Provider-assigned message id, when one is returned.
    pub message_id: Option<String>,
    /// Human-readable status, e.g. `"sent"`.
    pub status: String,
}

/// Trait for pluggable delivery transports (HTTP API, SMTP).
#[async_trait]
pub trait MailBackend: Send + Sync + std::fmt::Debug {
    /// Deliver an email through this backend.
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, MailerError>;

    /// Backend name, e.g. `"resend"`, `"smtp"`.
    fn backend_name(&self) -> &'static str;
}
