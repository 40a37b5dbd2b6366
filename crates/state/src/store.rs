use async_trait::async_trait;

use mailbrief_core::{ProcessedRecord, SenderClass, SenderRecord, TokenRecord};

use crate::error::StateError;

/// Durable record of which emails have been fully processed.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// Record expiry (90-day TTL) may be enforced lazily: a backend may keep
/// expired rows on disk as long as reads treat them as absent.
#[async_trait]
pub trait ProcessedStore: Send + Sync {
    /// Whether the email id has an unexpired processed record.
    async fn is_processed(&self, email_id: &str) -> Result<bool, StateError>;

    /// Fetch the record for an email id, if present and unexpired.
    async fn get(&self, email_id: &str) -> Result<Option<ProcessedRecord>, StateError>;

    /// Write a batch of records. Callers chunk to the backend's batch-write
    /// limit; an implementation never sees more than it advertises.
    async fn mark_processed(&self, records: &[ProcessedRecord]) -> Result<(), StateError>;

    /// Remove records whose TTL elapsed before `now_ms`. Returns the number
    /// removed.
    async fn cleanup_expired(&self, now_ms: i64) -> Result<u64, StateError>;
}

/// Two-population sender reputation store.
///
/// A `sender_email` lives in at most one population at a time. Writers
/// enforce this in `upsert` by removing the address from the other
/// population before inserting. Confidence decay is read-time only and is
/// applied by callers via [`SenderRecord::effective_confidence`].
#[async_trait]
pub trait SenderStore: Send + Sync {
    /// Look up a sender in either population by lowercased address.
    async fn get(&self, sender_email: &str) -> Result<Option<SenderRecord>, StateError>;

    /// Insert or replace a record, evicting the address from the opposite
    /// population when necessary.
    async fn upsert(&self, record: SenderRecord) -> Result<(), StateError>;

    /// Remove a sender from whichever population holds it. Returns `true`
    /// if a record existed.
    async fn remove(&self, sender_email: &str) -> Result<bool, StateError>;

    /// All records in one population.
    async fn list(&self, class: SenderClass) -> Result<Vec<SenderRecord>, StateError>;

    /// All records (either population) for a sender domain.
    async fn list_by_domain(&self, domain: &str) -> Result<Vec<SenderRecord>, StateError>;
}

/// OAuth refresh-token records, one per mailbox user.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<TokenRecord>, StateError>;

    async fn put(&self, record: TokenRecord) -> Result<(), StateError>;

    /// Stamp the token's `last_used` after a successful mailbox fetch.
    /// A missing record is not an error.
    async fn touch_last_used(&self, user_id: &str, now_ms: i64) -> Result<(), StateError>;
}
