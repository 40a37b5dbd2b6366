use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use mailbrief_core::{
    EmailItem, PipelineError, PipelineMessage, SenderClass, SenderRecord, Stage, now_ms,
};
use mailbrief_llm::{ChatRequest, ModelTier, parse_json_response};

use super::{StageHandler, emit_next, load_batch};
use crate::context::Services;
use crate::gate::ServiceGate;

/// Confidence floor for persisting a classification to the sender store.
const PERSIST_CONFIDENCE_FLOOR: f64 = 70.0;

/// Confidence bump applied when a known AI sender is re-confirmed.
const RECONFIRM_BUMP: f64 = 5.0;

const STRICT_PROMPT: &str = "You classify emails for an AI-news digest. Mark an email AI only if it is \
specifically about artificial intelligence: AI/ML research, AI tools, AI companies, \
or directly AI-adjacent topics. General tech news, programming tutorials, and \
hardware unrelated to AI are NON_AI. Respond with a JSON object keyed by email id; \
each value must be {\"classification\": \"AI\" | \"NON_AI\", \"confidence\": 0-100, \
\"reasoning\": \"...\"}.";

const CLEANUP_PROMPT: &str = "You classify emails for an AI-news digest during an inbox cleanup. Mark an \
email AI if it is about artificial intelligence, machine learning, AI tools or \
companies, or is broadly AI-adjacent; lean inclusive when in doubt. Respond with a \
JSON object keyed by email id; each value must be {\"classification\": \"AI\" | \
\"NON_AI\", \"confidence\": 0-100, \"reasoning\": \"...\"}.";

#[derive(Debug, Deserialize)]
struct Verdict {
    classification: SenderClass,
    confidence: f64,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: Option<String>,
}

/// Classify stage: LLM-classify unknown senders, persist confident
/// verdicts, and settle the AI email set.
pub struct ClassifyStage {
    services: Arc<Services>,
}

impl ClassifyStage {
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn prompt_for(mode: mailbrief_core::Mode) -> &'static str {
        if mode == mailbrief_core::Mode::Cleanup {
            CLEANUP_PROMPT
        } else {
            STRICT_PROMPT
        }
    }

    fn group_request(emails: &[EmailItem], system: &str) -> ChatRequest {
        let items: Vec<serde_json::Value> = emails
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id,
                    "sender": e.sender.to_string(),
                    "subject": e.subject,
                    "snippet": e.snippet.chars().take(200).collect::<String>(),
                })
            })
            .collect();
        ChatRequest::json(
            ModelTier::Quality,
            system,
            serde_json::Value::Array(items).to_string(),
        )
    }

    /// Classify one sub-group; an unparseable answer is retried once.
    async fn classify_group(
        &self,
        gate: &ServiceGate,
        emails: &[EmailItem],
        system: &str,
    ) -> Result<HashMap<String, Verdict>, PipelineError> {
        let request = Self::group_request(emails, system);
        let content = gate
            .call("openai", "classify", None, self.services.chat.complete(&request))
            .await
            .map_err(|e| PipelineError::new(e.error_code(), Stage::Classify, e.to_string()))?;

        match parse_json_response::<HashMap<String, Verdict>>(&content) {
            Ok(verdicts) => Ok(verdicts),
            Err(first) => {
                warn!(error = %first, "classification response unparseable, retrying once");
                let content = gate
                    .call("openai", "classify", None, self.services.chat.complete(&request))
                    .await
                    .map_err(|e| {
                        PipelineError::new(e.error_code(), Stage::Classify, e.to_string())
                    })?;
                parse_json_response::<HashMap<String, Verdict>>(&content)
                    .map_err(|e| PipelineError::from_service(Stage::Classify, &e))
            }
        }
    }

    /// Persist a confident verdict, honoring the exclusivity invariant and
    /// the self-reference guard.
    async fn persist_verdict(
        &self,
        email: &EmailItem,
        class: SenderClass,
        confidence: f64,
    ) -> Result<(), PipelineError> {
        let address = email.sender.canonical_address();
        if address.eq_ignore_ascii_case(&self.services.config.own_address) {
            return Ok(());
        }

        let now = now_ms();
        let existing = self
            .services
            .senders
            .get(&address)
            .await
            .map_err(|e| PipelineError::from_service(Stage::Classify, &e))?;

        let record = match existing {
            Some(mut r) if r.class == SenderClass::Ai && class == SenderClass::Ai => {
                r.confidence = (r.confidence + RECONFIRM_BUMP).min(100.0);
                r.last_classified_at = now;
                r.classification_count += 1;
                r
            }
            _ => {
                let mut r = SenderRecord::new(&address, class, confidence, now);
                if let Some(ref name) = email.sender.name {
                    r = r.with_display_name(name.clone());
                }
                r
            }
        };

        self.services
            .senders
            .upsert(record)
            .await
            .map_err(|e| PipelineError::from_service(Stage::Classify, &e))
    }
}

#[async_trait]
impl StageHandler for ClassifyStage {
    fn stage(&self) -> Stage {
        Stage::Classify
    }

    async fn handle(&self, msg: PipelineMessage) -> Result<PipelineMessage, PipelineError> {
        let services = &self.services;
        let mut batch = load_batch(services, &msg, Stage::Classify).await?;

        if batch.unknown_ids.is_empty() {
            batch.ai_email_ids = batch.known_ai_ids.clone();
            info!(ai = batch.ai_email_ids.len(), "no unknown senders, classify is a pass-through");
            return emit_next(services, &msg, &batch, Stage::Extract).await;
        }

        let unknown: Vec<EmailItem> = batch
            .emails
            .iter()
            .filter(|e| batch.unknown_ids.contains(&e.id))
            .cloned()
            .collect();
        let classified_count = unknown.len();

        let system = Self::prompt_for(batch.mode);
        let group_size = services.config.classify_group_size();
        let semaphore = Arc::new(Semaphore::new(services.config.classify_concurrency));
        let stagger = services.config.classify_stagger;
        let gate = services.gate();

        let groups: Vec<&[EmailItem]> = unknown.chunks(group_size).collect();
        let futures = groups.iter().enumerate().map(|(index, group)| {
            let semaphore = Arc::clone(&semaphore);
            let gate = gate.clone();
            async move {
                tokio::time::sleep(stagger * index as u32).await;
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                self.classify_group(&gate, group, system).await
            }
        });
        let results: Vec<Result<HashMap<String, Verdict>, PipelineError>> =
            join_all(futures).await;

        let mut error_count = 0u32;
        let mut skipped = 0u32;
        let mut new_ai: Vec<String> = Vec::new();

        for (group, result) in groups.iter().zip(results) {
            match result {
                Ok(verdicts) => {
                    for email in group.iter() {
                        match verdicts.get(&email.id) {
                            Some(v) if v.confidence >= PERSIST_CONFIDENCE_FLOOR => {
                                self.persist_verdict(email, v.classification, v.confidence)
                                    .await?;
                                if v.classification == SenderClass::Ai {
                                    new_ai.push(email.id.clone());
                                } else {
                                    skipped += 1;
                                }
                            }
                            // Low-confidence or missing verdicts are dropped
                            // without persisting; the sender stays unknown.
                            _ => skipped += 1,
                        }
                    }
                }
                Err(e) if e.code == mailbrief_core::ErrorCode::AuthInvalid => return Err(e),
                Err(e) => {
                    warn!(error = %e, group = group.len(), "classification sub-group failed");
                    error_count += group.len() as u32;
                }
            }
        }

        batch.ai_email_ids = batch.known_ai_ids.clone();
        batch.ai_email_ids.extend(new_ai);
        let ai_ids = batch.ai_email_ids.clone();
        batch.emails.retain(|e| ai_ids.contains(&e.id));

        info!(
            classified = classified_count,
            ai = batch.ai_email_ids.len(),
            skipped,
            errors = error_count,
            "classify complete"
        );

        let mut out = msg;
        out.metadata.error_count += error_count;
        out.metadata.skipped_count += skipped + error_count;
        emit_next(services, &out, &batch, Stage::Extract).await
    }
}
