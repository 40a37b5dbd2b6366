//! Shared fixtures for server tests.

use std::sync::Arc;
use std::time::Duration;

use mailbrief_blob::MemoryBlobStore;
use mailbrief_core::{CostTracker, EmailItem};
use mailbrief_enrich::{MockExtractor, MockSearch};
use mailbrief_gmail::MockMailbox;
use mailbrief_llm::MockChatClient;
use mailbrief_mailer::MockMailer;
use mailbrief_pipeline::{
    BreakerRegistry, Orchestrator, PipelineConfig, RetryConfig, RetryStrategy, Services,
};
use mailbrief_state_memory::{MemoryProcessedStore, MemorySenderStore, MemoryTokenStore};

use crate::api::AppState;
use crate::executions::ExecutionRegistry;
use crate::runner::DigestRunner;

pub(crate) fn test_services(emails: Vec<EmailItem>) -> Arc<Services> {
    let config = PipelineConfig {
        recipient: "user@example.com".to_owned(),
        own_address: "digest@mailbrief.example".to_owned(),
        inter_batch_delay: Duration::from_millis(1),
        retry: RetryConfig {
            max_attempts: 2,
            strategy: RetryStrategy::None,
        },
        ..PipelineConfig::default()
    };
    Arc::new(Services {
        mailbox: Arc::new(MockMailbox::new(emails)),
        chat: Arc::new(MockChatClient::always("{}")),
        extractor: Arc::new(MockExtractor::new()),
        search: Arc::new(MockSearch::new()),
        mailer: Arc::new(MockMailer::new()),
        processed: Arc::new(MemoryProcessedStore::new()),
        senders: Arc::new(MemorySenderStore::new()),
        tokens: Arc::new(MemoryTokenStore::new()),
        blobs: Arc::new(MemoryBlobStore::new()),
        cost: Arc::new(CostTracker::default()),
        breakers: Arc::new(BreakerRegistry::default()),
        config,
    })
}

pub(crate) fn test_runner(emails: Vec<EmailItem>) -> (DigestRunner, Arc<ExecutionRegistry>) {
    let services = test_services(emails);
    let orchestrator = Arc::new(Orchestrator::new(services));
    let executions = Arc::new(ExecutionRegistry::default());
    (
        DigestRunner::new(orchestrator, Arc::clone(&executions)),
        executions,
    )
}

pub(crate) fn test_state(emails: Vec<EmailItem>) -> AppState {
    let (runner, executions) = test_runner(emails);
    AppState {
        runner: Arc::new(runner),
        executions,
    }
}
