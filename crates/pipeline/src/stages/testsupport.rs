//! Shared fixtures for stage tests.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use mailbrief_blob::MemoryBlobStore;
use mailbrief_core::{CostTracker, EmailItem, EmailSender, Mode, PipelineMessage, RunWindow, Stage, now_ms};
use mailbrief_enrich::{MockExtractor, MockSearch};
use mailbrief_gmail::MockMailbox;
use mailbrief_llm::MockChatClient;
use mailbrief_mailer::MockMailer;
use mailbrief_state_memory::{MemoryProcessedStore, MemorySenderStore, MemoryTokenStore};

use crate::batch::DigestBatch;
use crate::breaker::BreakerRegistry;
use crate::config::{PipelineConfig, RetryConfig};
use crate::context::Services;
use crate::retry::RetryStrategy;

/// Handles to every mock inside a [`Services`] bundle.
pub(crate) type MockSet = (
    Arc<Services>,
    Arc<MockMailbox>,
    Arc<MockChatClient>,
    Arc<MockExtractor>,
    Arc<MockSearch>,
    Arc<MockMailer>,
);

/// A test config with real limits but no real-time delays.
pub(crate) fn fast_config() -> PipelineConfig {
    PipelineConfig {
        recipient: "user@example.com".to_owned(),
        own_address: "digest@mailbrief.example".to_owned(),
        classify_stagger: Duration::from_millis(1),
        inter_batch_delay: Duration::from_millis(10),
        retry: RetryConfig {
            max_attempts: 3,
            strategy: RetryStrategy::Constant {
                delay: Duration::from_millis(1),
            },
        },
        ..PipelineConfig::default()
    }
}

/// Build a full mock service bundle over the given mailbox contents.
pub(crate) fn services_with(emails: Vec<EmailItem>) -> MockSet {
    services_with_config(emails, fast_config())
}

pub(crate) fn services_with_config(emails: Vec<EmailItem>, config: PipelineConfig) -> MockSet {
    let mailbox = Arc::new(MockMailbox::new(emails));
    let chat = Arc::new(MockChatClient::new());
    let extractor = Arc::new(MockExtractor::new());
    let search = Arc::new(MockSearch::new());
    let mailer = Arc::new(MockMailer::new());

    let max_cost = config.max_cost_per_run;
    let services = Arc::new(Services {
        mailbox: mailbox.clone(),
        chat: chat.clone(),
        extractor: extractor.clone(),
        search: search.clone(),
        mailer: mailer.clone(),
        processed: Arc::new(MemoryProcessedStore::new()),
        senders: Arc::new(MemorySenderStore::new()),
        tokens: Arc::new(MemoryTokenStore::new()),
        blobs: Arc::new(MemoryBlobStore::new()),
        cost: Arc::new(CostTracker::new(max_cost)),
        breakers: Arc::new(BreakerRegistry::default()),
        config,
    });
    (services, mailbox, chat, extractor, search, mailer)
}

/// An email with the given id and sender address.
pub(crate) fn test_email(id: &str, sender: &str) -> EmailItem {
    EmailItem {
        id: id.to_owned(),
        thread_id: format!("t-{id}"),
        sender: EmailSender::parse(&format!("Sender <{sender}>")),
        subject: format!("AI subject {id}"),
        date: "2024-06-01T08:00:00+00:00".to_owned(),
        snippet: format!("snippet {id}"),
        body: format!("body of {id} https://news.example/{id}"),
        labels: vec!["INBOX".to_owned()],
    }
}

/// Seed envelope carrying an empty batch for the Fetch stage.
pub(crate) async fn seed_message(
    services: &Services,
    mode: Mode,
    window: Option<RunWindow>,
) -> PipelineMessage {
    let batch = DigestBatch::new(mode, window);
    let payload = services
        .payloads()
        .store(&batch.to_value().unwrap(), Uuid::new_v4(), Stage::Fetch)
        .await
        .unwrap();
    PipelineMessage::new(Uuid::new_v4(), Uuid::new_v4(), Stage::Fetch, payload, now_ms())
}

/// Envelope at an arbitrary stage carrying the given batch.
pub(crate) async fn message_with_batch(
    services: &Services,
    batch: &DigestBatch,
    stage: Stage,
) -> PipelineMessage {
    let payload = services
        .payloads()
        .store(&batch.to_value().unwrap(), Uuid::new_v4(), stage)
        .await
        .unwrap();
    PipelineMessage::new(Uuid::new_v4(), Uuid::new_v4(), stage, payload, now_ms())
}

/// A classification verdict JSON body keyed by email id.
pub(crate) fn classify_response(entries: &[(&str, &str, u32)]) -> String {
    let mut map = serde_json::Map::new();
    for (id, class, confidence) in entries {
        map.insert(
            (*id).to_owned(),
            serde_json::json!({
                "classification": class,
                "confidence": confidence,
                "reasoning": "test verdict",
            }),
        );
    }
    serde_json::Value::Object(map).to_string()
}

/// A minimal analyze response body.
pub(crate) fn analyze_response(title: &str) -> String {
    serde_json::json!({
        "title": title,
        "summary": format!("Summary of {title}"),
        "key_insights": ["insight one", "insight two"],
        "why_it_matters": "because tests",
        "action_items": ["try it"],
    })
    .to_string()
}
