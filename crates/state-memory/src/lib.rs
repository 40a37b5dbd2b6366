//! In-memory store backends.
//!
//! Used by tests and single-process deployments. TTLs are enforced at read
//! time; `cleanup_expired` physically removes stale rows.

use async_trait::async_trait;
use dashmap::DashMap;

use mailbrief_core::{ProcessedRecord, SenderClass, SenderRecord, TokenRecord, now_ms};
use mailbrief_state::{ProcessedStore, SenderStore, StateError, TokenStore};

/// DashMap-backed [`ProcessedStore`].
#[derive(Debug, Default)]
pub struct MemoryProcessedStore {
    records: DashMap<String, ProcessedRecord>,
}

impl MemoryProcessedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) records.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = now_ms();
        self.records.iter().filter(|r| !r.is_expired(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProcessedStore for MemoryProcessedStore {
    async fn is_processed(&self, email_id: &str) -> Result<bool, StateError> {
        Ok(self
            .records
            .get(email_id)
            .is_some_and(|r| !r.is_expired(now_ms())))
    }

    async fn get(&self, email_id: &str) -> Result<Option<ProcessedRecord>, StateError> {
        Ok(self
            .records
            .get(email_id)
            .filter(|r| !r.is_expired(now_ms()))
            .map(|r| r.clone()))
    }

    async fn mark_processed(&self, records: &[ProcessedRecord]) -> Result<(), StateError> {
        for record in records {
            self.records.insert(record.email_id.clone(), record.clone());
        }
        Ok(())
    }

    async fn cleanup_expired(&self, now_ms: i64) -> Result<u64, StateError> {
        let before = self.records.len();
        self.records.retain(|_, r| !r.is_expired(now_ms));
        Ok((before - self.records.len()) as u64)
    }
}

/// DashMap-backed [`SenderStore`] with one map per population.
#[derive(Debug, Default)]
pub struct MemorySenderStore {
    ai: DashMap<String, SenderRecord>,
    non_ai: DashMap<String, SenderRecord>,
}

impl MemorySenderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn population(&self, class: SenderClass) -> &DashMap<String, SenderRecord> {
        match class {
            SenderClass::Ai => &self.ai,
            SenderClass::NonAi => &self.non_ai,
        }
    }
}

#[async_trait]
impl SenderStore for MemorySenderStore {
    async fn get(&self, sender_email: &str) -> Result<Option<SenderRecord>, StateError> {
        let key = sender_email.to_lowercase();
        Ok(self
            .ai
            .get(&key)
            .or_else(|| self.non_ai.get(&key))
            .map(|r| r.clone()))
    }

    async fn upsert(&self, record: SenderRecord) -> Result<(), StateError> {
        let key = record.sender_email.clone();
        // Exclusivity invariant: evict from the opposite population first.
        match record.class {
            SenderClass::Ai => self.non_ai.remove(&key),
            SenderClass::NonAi => self.ai.remove(&key),
        };
        self.population(record.class).insert(key, record);
        Ok(())
    }

    async fn remove(&self, sender_email: &str) -> Result<bool, StateError> {
        let key = sender_email.to_lowercase();
        let existed_ai = self.ai.remove(&key).is_some();
        let existed_non_ai = self.non_ai.remove(&key).is_some();
        Ok(existed_ai || existed_non_ai)
    }

    async fn list(&self, class: SenderClass) -> Result<Vec<SenderRecord>, StateError> {
        Ok(self
            .population(class)
            .iter()
            .map(|r| r.clone())
            .collect())
    }

    async fn list_by_domain(&self, domain: &str) -> Result<Vec<SenderRecord>, StateError> {
        let domain = domain.to_lowercase();
        Ok(self
            .ai
            .iter()
            .chain(self.non_ai.iter())
            .filter(|r| r.domain == domain)
            .map(|r| r.clone())
            .collect())
    }
}

/// DashMap-backed [`TokenStore`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, TokenRecord>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, user_id: &str) -> Result<Option<TokenRecord>, StateError> {
        Ok(self.tokens.get(user_id).map(|r| r.clone()))
    }

    async fn put(&self, record: TokenRecord) -> Result<(), StateError> {
        self.tokens.insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn touch_last_used(&self, user_id: &str, now_ms: i64) -> Result<(), StateError> {
        if let Some(mut record) = self.tokens.get_mut(user_id) {
            record.last_used_ms = Some(now_ms);
        }
        Ok(())
    }
}
