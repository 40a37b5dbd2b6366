use async_trait::async_trait;

use mailbrief_core::EmailItem;

use crate::error::MailboxError;

/// Read/modify operations against a Gmail-like provider.
///
/// Implementations handle pagination, batching, and authentication
/// internally; callers see whole result sets.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// List message ids matching a search query, up to `max_results`.
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<String>, MailboxError>;

    /// Fetch full messages for the given ids.
    async fn fetch_messages(&self, ids: &[String]) -> Result<Vec<EmailItem>, MailboxError>;

    /// Remove the `INBOX` label from the given ids.
    async fn archive(&self, ids: &[String]) -> Result<(), MailboxError>;
}
