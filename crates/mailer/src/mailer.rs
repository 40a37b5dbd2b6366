use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use mailbrief_core::{DigestOutput, PipelineError};

use crate::backend::{MailBackend, OutboundEmail, SendReceipt};
use crate::error::MailerError;
use crate::render::{Renderer, digest_subject, error_subject};

/// High-level outbound mail operations used by the pipeline.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Render and deliver a digest to the recipient.
    async fn send_digest(&self, to: &str, digest: &DigestOutput)
    -> Result<SendReceipt, MailerError>;

    /// Deliver an error notification for a failed branch.
    async fn send_error_notice(
        &self,
        to: &str,
        context: &str,
        error: &PipelineError,
    ) -> Result<(), MailerError>;

    /// Deliver a re-authorization notice with a link to restore mailbox
    /// access.
    async fn send_reauth_notice(&self, to: &str) -> Result<(), MailerError>;
}

/// [`Mailer`] over a pluggable delivery backend.
pub struct DigestMailer {
    backend: Arc<dyn MailBackend>,
    renderer: Renderer,
    from: String,
    reauth_url: String,
}

impl std::fmt::Debug for DigestMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestMailer")
            .field("backend", &self.backend.backend_name())
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl DigestMailer {
    pub fn new(
        backend: Arc<dyn MailBackend>,
        from: impl Into<String>,
        reauth_url: impl Into<String>,
    ) -> Result<Self, MailerError> {
        Ok(Self {
            backend,
            renderer: Renderer::new()?,
            from: from.into(),
            reauth_url: reauth_url.into(),
        })
    }
}

#[async_trait]
impl Mailer for DigestMailer {
    async fn send_digest(
        &self,
        to: &str,
        digest: &DigestOutput,
    ) -> Result<SendReceipt, MailerError> {
        let html_body = self.renderer.render_digest(digest)?;
        let email = OutboundEmail {
            from: self.from.clone(),
            to: to.to_owned(),
            subject: digest_subject(digest.mode),
            html_body,
            text_body: None,
        };
        let receipt = self.backend.send(&email).await?;
        info!(
            to,
            items = digest.summaries.len(),
            backend = self.backend.backend_name(),
            "digest delivered"
        );
        Ok(receipt)
    }

    async fn send_error_notice(
        &self,
        to: &str,
        context: &str,
        error: &PipelineError,
    ) -> Result<(), MailerError> {
        let html_body = self.renderer.render_error_notice(context, error)?;
        let email = OutboundEmail {
            from: self.from.clone(),
            to: to.to_owned(),
            subject: error_subject(context),
            html_body,
            text_body: None,
        };
        self.backend.send(&email).await?;
        Ok(())
    }

    async fn send_reauth_notice(&self, to: &str) -> Result<(), MailerError> {
        let html_body = self.renderer.render_reauth_notice(&self.reauth_url)?;
        let email = OutboundEmail {
            from: self.from.clone(),
            to: to.to_owned(),
            subject: "[ALERT] AI Digest needs mailbox re-authorization".to_owned(),
            html_body,
            text_body: None,
        };
        self.backend.send(&email).await?;
        Ok(())
    }
}
