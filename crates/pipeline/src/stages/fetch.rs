use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use mailbrief_core::{Mode, PipelineError, PipelineMessage, Stage, now_ms};
use mailbrief_gmail::{build_query, validate_window};

use super::{StageHandler, emit_next, load_batch};
use crate::context::Services;

/// Fetch stage: query the mailbox, decode messages, and partition senders.
pub struct FetchStage {
    services: Arc<Services>,
}

impl FetchStage {
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StageHandler for FetchStage {
    fn stage(&self) -> Stage {
        Stage::Fetch
    }

    async fn handle(&self, msg: PipelineMessage) -> Result<PipelineMessage, PipelineError> {
        let services = &self.services;
        let mut batch = load_batch(services, &msg, Stage::Fetch).await?;

        if batch.mode == Mode::Historical {
            let window = batch.window.as_ref().ok_or_else(|| {
                PipelineError::new(
                    mailbrief_core::ErrorCode::Validation,
                    Stage::Fetch,
                    "historical mode requires start and end dates",
                )
            })?;
            validate_window(window, Utc::now().date_naive())
                .map_err(|e| PipelineError::from_service(Stage::Fetch, &e))?;
        }

        let query = build_query(batch.mode, batch.window.as_ref())
            .map_err(|e| PipelineError::from_service(Stage::Fetch, &e))?;
        let cap = match batch.mode {
            Mode::Cleanup => services.config.cleanup_scan_cap,
            Mode::Weekly | Mode::Historical => services.config.max_emails_per_run,
        };

        let gate = services.gate();
        let ids = gate
            .call("gmail", "search", None, services.mailbox.search(&query, cap))
            .await
            .map_err(|e| {
                PipelineError::new(e.error_code(), Stage::Fetch, e.to_string())
            })?;

        let emails = gate
            .call("gmail", "get", None, services.mailbox.fetch_messages(&ids))
            .await
            .map_err(|e| {
                PipelineError::new(e.error_code(), Stage::Fetch, e.to_string())
            })?;

        let mut next = msg.metadata.clone();
        next.email_count = emails.len() as u32;

        // Partition: already processed, known AI, known non-AI, unknown.
        let now = now_ms();
        let mut retained = Vec::with_capacity(emails.len());
        for email in emails {
            let processed = services
                .processed
                .is_processed(&email.id)
                .await
                .map_err(|e| PipelineError::from_service(Stage::Fetch, &e))?;
            if processed {
                batch.already_processed += 1;
                continue;
            }

            let record = services
                .senders
                .get(&email.sender.canonical_address())
                .await
                .map_err(|e| PipelineError::from_service(Stage::Fetch, &e))?;

            match record {
                Some(r) if r.is_known(now) => match r.class {
                    mailbrief_core::SenderClass::Ai => {
                        batch.known_ai_ids.push(email.id.clone());
                        retained.push(email);
                    }
                    mailbrief_core::SenderClass::NonAi => {
                        batch.known_non_ai += 1;
                    }
                },
                // Unknown sender, or confidence decayed below the floor:
                // goes to the Classify stage.
                _ => {
                    batch.unknown_ids.push(email.id.clone());
                    retained.push(email);
                }
            }
        }
        batch.emails = retained;

        info!(
            found = next.email_count,
            known_ai = batch.known_ai_ids.len(),
            unknown = batch.unknown_ids.len(),
            known_non_ai = batch.known_non_ai,
            already_processed = batch.already_processed,
            "fetch complete"
        );
        debug!(%query, "mailbox query used");

        let mut out = msg;
        out.metadata = next;
        out.metadata.skipped_count += batch.already_processed + batch.known_non_ai;
        emit_next(services, &out, &batch, Stage::Classify).await
    }
}
