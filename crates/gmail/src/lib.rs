pub mod client;
pub mod error;
pub mod mailbox;
pub mod mock;
pub mod parse;
pub mod query;
pub mod types;

pub use client::{GmailClient, GmailConfig};
pub use error::MailboxError;
pub use mailbox::Mailbox;
pub use mock::{MockFailure, MockMailbox};
pub use query::{MAX_HISTORICAL_SPAN_DAYS, build_query, validate_window};
