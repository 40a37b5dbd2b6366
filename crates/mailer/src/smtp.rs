use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info};

use crate::backend::{MailBackend, OutboundEmail, SendReceipt};
use crate::error::MailerError;

/// Configuration for the SMTP delivery backend.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
}

/// SMTP delivery backend using `lettre`.
pub struct SmtpBackend {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpBackend")
            .field("host", &self.config.smtp_host)
            .field("port", &self.config.smtp_port)
            .finish_non_exhaustive()
    }
}

impl SmtpBackend {
    pub fn new(config: SmtpConfig) -> Result<Self, MailerError> {
        let transport = build_transport(&config)?;
        Ok(Self { config, transport })
    }

    /// Create a backend with a pre-built transport (for testing).
    pub fn with_transport(
        config: SmtpConfig,
        transport: AsyncSmtpTransport<Tokio1Executor>,
    ) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl MailBackend for SmtpBackend {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, MailerError> {
        debug!(to = %email.to, subject = %email.subject, "building SMTP message");
        let message = build_message(email)?;

        info!(to = %email.to, subject = %email.subject, "sending email via SMTP");
        self.transport.send(message).await.map_err(|e| {
            error!(error = %e, "SMTP send failed");
            map_smtp_error(&e)
        })?;

        Ok(SendReceipt {
            message_id: None,
            status: "sent".to_owned(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "smtp"
    }
}

/// Build a `lettre::Message` from the outbound email.
fn build_message(email: &OutboundEmail) -> Result<Message, MailerError> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|e| MailerError::Configuration(format!("invalid from address: {e}")))?;
    let to: Mailbox = email.to.parse().map_err(|e| MailerError::Delivery {
        status: None,
        message: format!("invalid recipient address: {e}"),
    })?;

    let builder = Message::builder().from(from).to(to).subject(&email.subject);

    let message = match &email.text_body {
        Some(text) => builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(lettre::message::header::ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(lettre::message::header::ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| MailerError::Delivery {
                status: None,
                message: format!("failed to build email: {e}"),
            })?,
        None => builder
            .singlepart(
                SinglePart::builder()
                    .header(lettre::message::header::ContentType::TEXT_HTML)
                    .body(email.html_body.clone()),
            )
            .map_err(|e| MailerError::Delivery {
                status: None,
                message: format!("failed to build email: {e}"),
            })?,
    };

    Ok(message)
}

/// Build an async SMTP transport from the given configuration.
fn build_transport(
    config: &SmtpConfig,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailerError> {
    let builder = if config.tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| MailerError::Configuration(format!("SMTP TLS relay error: {e}")))?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
    };

    let builder = builder.port(config.smtp_port);

    let builder = if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        builder.credentials(Credentials::new(user.clone(), pass.clone()))
    } else {
        builder
    };

    Ok(builder.build())
}

/// Map a lettre SMTP error to the appropriate `MailerError` variant.
fn map_smtp_error(error: &lettre::transport::smtp::Error) -> MailerError {
    let message = error.to_string();
    if error.is_permanent() {
        MailerError::Delivery {
            status: None,
            message: format!("permanent SMTP error: {message}"),
        }
    } else {
        MailerError::Network(format!("SMTP error: {message}"))
    }
}
