pub mod backend;
pub mod error;
pub mod mailer;
pub mod mock;
pub mod render;
pub mod resend;
pub mod smtp;

pub use backend::{MailBackend, OutboundEmail, SendReceipt};
pub use error::MailerError;
pub use mailer::{DigestMailer, Mailer};
pub use mock::MockMailer;
pub use render::{Renderer, digest_subject, error_subject};
pub use resend::{ResendBackend, ResendConfig};
pub use smtp::{SmtpBackend, SmtpConfig};
