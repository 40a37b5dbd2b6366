use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use mailbrief_core::{DigestOutput, PipelineError};

use crate::backend::SendReceipt;
use crate::error::MailerError;
use crate::mailer::Mailer;

/// Recording [`Mailer`] for pipeline tests.
#[derive(Debug, Default)]
pub struct MockMailer {
    digests: Mutex<Vec<(String, DigestOutput)>>,
    error_notices: Mutex<Vec<(String, String)>>,
    reauth_notices: Mutex<Vec<String>>,
    fail_digest: AtomicBool,
}

impl MockMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent digest send fail.
    pub fn fail_digest_sends(&self) {
        self.fail_digest.store(true, Ordering::SeqCst);
    }

    /// Clear a previously injected digest failure.
    pub fn restore_digest_sends(&self) {
        self.fail_digest.store(false, Ordering::SeqCst);
    }

    /// Digests delivered so far, as `(recipient, digest)` pairs.
    #[must_use]
    pub fn digests(&self) -> Vec<(String, DigestOutput)> {
        self.digests.lock().unwrap().clone()
    }

    /// Error notices delivered so far, as `(recipient, context)` pairs.
    #[must_use]
    pub fn error_notices(&self) -> Vec<(String, String)> {
        self.error_notices.lock().unwrap().clone()
    }

    /// Recipients of re-auth notices so far.
    #[must_use]
    pub fn reauth_notices(&self) -> Vec<String> {
        self.reauth_notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_digest(
        &self,
        to: &str,
        digest: &DigestOutput,
    ) -> Result<SendReceipt, MailerError> {
        if self.fail_digest.load(Ordering::SeqCst) {
            return Err(MailerError::Delivery {
                status: Some(500),
                message: "mock: delivery refused".into(),
            });
        }
        self.digests
            .lock()
            .unwrap()
            .push((to.to_owned(), digest.clone()));
        Ok(SendReceipt {
            message_id: Some(format!("mock-{}", self.digests.lock().unwrap().len())),
            status: "sent".into(),
        })
    }

    async fn send_error_notice(
        &self,
        to: &str,
        context: &str,
        _error: &PipelineError,
    ) -> Result<(), MailerError> {
        self.error_notices
            .lock()
            .unwrap()
            .push((to.to_owned(), context.to_owned()));
        Ok(())
    }

    async fn send_reauth_notice(&self, to: &str) -> Result<(), MailerError> {
        self.reauth_notices.lock().unwrap().push(to.to_owned());
        Ok(())
    }
}
