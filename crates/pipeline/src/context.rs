use std::sync::Arc;

use mailbrief_blob::BlobStore;
use mailbrief_core::CostTracker;
use mailbrief_enrich::{ArticleExtractor, WebSearch};
use mailbrief_gmail::Mailbox;
use mailbrief_llm::ChatClient;
use mailbrief_mailer::Mailer;
use mailbrief_state::{ProcessedStore, SenderStore, TokenStore};

use crate::breaker::BreakerRegistry;
use crate::config::PipelineConfig;
use crate::gate::ServiceGate;
use crate::payload::PayloadManager;

/// Everything a stage handler needs, shared across the run.
///
/// Handlers own nothing across invocations; all state lives behind these
/// shared services.
pub struct Services {
    pub mailbox: Arc<dyn Mailbox>,
    pub chat: Arc<dyn ChatClient>,
    pub extractor: Arc<dyn ArticleExtractor>,
    pub search: Arc<dyn WebSearch>,
    pub mailer: Arc<dyn Mailer>,

    pub processed: Arc<dyn ProcessedStore>,
    pub senders: Arc<dyn SenderStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub blobs: Arc<dyn BlobStore>,

    pub cost: Arc<CostTracker>,
    pub breakers: Arc<BreakerRegistry>,
    pub config: PipelineConfig,
}

impl Services {
    /// The gate every outbound call goes through.
    #[must_use]
    pub fn gate(&self) -> ServiceGate {
        ServiceGate::new(Arc::clone(&self.cost), Arc::clone(&self.breakers))
    }

    /// Payload manager over the configured blob store.
    #[must_use]
    pub fn payloads(&self) -> PayloadManager {
        PayloadManager::new(Arc::clone(&self.blobs))
            .with_inline_limit(self.config.inline_payload_limit)
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
