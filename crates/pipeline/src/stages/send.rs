use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use mailbrief_core::{
    DigestOutput, DigestStats, PipelineError, PipelineMessage, ProcessedRecord, SenderClass,
    SenderRecord, Stage, now_ms,
};

use super::{StageHandler, emit_final, load_batch};
use crate::context::Services;

/// Send stage: render and deliver the digest, then (and only then) mark,
/// enrich, archive, and clean up.
///
/// The ordering is the stage's contract: a failed delivery leaves every
/// email unmarked so the next run retries them.
pub struct SendStage {
    services: Arc<Services>,
}

impl SendStage {
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Feed delivered senders back into the AI population.
    async fn enrich_senders(&self, batch: &crate::DigestBatch) {
        let now = now_ms();
        for item in &batch.summaries {
            let Some(email) = batch.email(&item.email_id) else {
                continue;
            };
            let address = email.sender.canonical_address();
            if address.eq_ignore_ascii_case(&self.services.config.own_address) {
                continue;
            }

            let record = match self.services.senders.get(&address).await {
                Ok(Some(mut existing)) if existing.class == SenderClass::Ai => {
                    existing.confidence = (existing.confidence + 5.0).min(100.0);
                    existing.last_classified_at = now;
                    existing.classification_count += 1;
                    existing
                }
                Ok(_) => {
                    let mut r = SenderRecord::new(&address, SenderClass::Ai, 75.0, now);
                    if let Some(ref name) = email.sender.name {
                        r = r.with_display_name(name.clone());
                    }
                    r
                }
                Err(e) => {
                    warn!(error = %e, "sender enrichment read failed");
                    continue;
                }
            };
            if let Err(e) = self.services.senders.upsert(record).await {
                warn!(error = %e, "sender enrichment write failed");
            }
        }
    }
}

#[async_trait]
impl StageHandler for SendStage {
    fn stage(&self) -> Stage {
        Stage::Send
    }

    async fn handle(&self, msg: PipelineMessage) -> Result<PipelineMessage, PipelineError> {
        let services = &self.services;
        let batch = load_batch(services, &msg, Stage::Send).await?;

        if batch.summaries.is_empty() {
            info!("no summaries to send, skipping delivery");
            return emit_final(services, &msg, &batch).await;
        }

        let now = Utc::now();
        let summaries: Vec<_> = batch.summaries.iter().map(|s| s.summary.clone()).collect();
        let digest = DigestOutput::new(
            summaries,
            DigestStats {
                total_emails: msg.metadata.email_count,
                ai_emails: batch.ai_email_ids.len() as u32,
                processed_emails: batch.summaries.len() as u32,
                total_cost: services.cost.total_cost(),
            },
            batch.mode,
            now.to_rfc3339(),
        );

        // 1-2. Render and deliver. Failure here must leave no trace in the
        // processed store.
        let gate = services.gate();
        gate.call(
            "resend",
            "send",
            None,
            services.mailer.send_digest(&services.config.recipient, &digest),
        )
        .await
        .map_err(|e| PipelineError::new(e.error_code(), Stage::Send, e.to_string()))?;

        info!(
            recipient = %services.config.recipient,
            items = batch.summaries.len(),
            "digest delivered"
        );

        // 3. Successful delivery gates everything below.
        self.enrich_senders(&batch).await;

        let records: Vec<ProcessedRecord> = batch
            .summaries
            .iter()
            .map(|item| {
                let subject = batch
                    .email(&item.email_id)
                    .map(|e| e.subject.clone())
                    .unwrap_or_default();
                ProcessedRecord::new(item.email_id.clone(), subject, now)
            })
            .collect();
        for chunk in records.chunks(services.config.processed_write_batch) {
            services
                .processed
                .mark_processed(chunk)
                .await
                .map_err(|e| PipelineError::from_service(Stage::Send, &e))?;
        }

        // 4. Archive is non-critical.
        let delivered_ids: Vec<String> =
            batch.summaries.iter().map(|s| s.email_id.clone()).collect();
        if let Err(e) = gate
            .call(
                "gmail",
                "archive",
                None,
                services.mailbox.archive(&delivered_ids),
            )
            .await
        {
            warn!(error = %e, "archive failed, emails remain in inbox");
        }

        // 5. Retention sweep, best-effort.
        match services.processed.cleanup_expired(now_ms()).await {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "processed-store retention sweep"),
            Err(e) => warn!(error = %e, "processed-store cleanup failed"),
        }

        let mut out = msg;
        out.metadata.processed_count += delivered_ids.len() as u32;
        emit_final(services, &out, &batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DigestBatch;
    use crate::batch::AnalyzedSummary;
    use crate::stages::testsupport::{message_with_batch, services_with, test_email};
    use mailbrief_core::{ErrorCode, Mode, Summary};

    fn delivery_batch(ids: &[&str]) -> DigestBatch {
        let mut batch = DigestBatch::new(Mode::Weekly, None);
        batch.emails = ids
            .iter()
            .map(|id| test_email(id, &format!("{id}@example.com")))
            .collect();
        batch.ai_email_ids = ids.iter().map(ToString::to_string).collect();
        batch.summaries = ids
            .iter()
            .map(|id| AnalyzedSummary {
                email_id: (*id).to_owned(),
                summary: Summary {
                    title: format!("Title {id}"),
                    summary: "analysis".into(),
                    key_insights: vec![],
                    why_it_matters: None,
                    action_items: vec![],
                    category: None,
                    sender: format!("Sender <{id}@example.com>"),
                    date: "2024-06-01".into(),
                    critique: None,
                },
            })
            .collect();
        batch
    }

    #[tokio::test]
    async fn delivery_then_mark_then_archive() {
        let (services, mailbox, _, _, _, mailer) = services_with(vec![]);
        let stage = SendStage::new(Arc::clone(&services));
        let msg = message_with_batch(&services, &delivery_batch(&["a", "b", "c"]), Stage::Send)
            .await;
        let out = stage.handle(msg).await.unwrap();

        // One digest with three items.
        let digests = mailer.digests();
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].0, "user@example.com");
        assert_eq!(digests[0].1.summaries.len(), 3);
        assert_eq!(digests[0].1.stats.processed_emails, 3);

        // All three marked and archived.
        for id in ["a", "b", "c"] {
            assert!(services.processed.is_processed(id).await.unwrap());
        }
        assert_eq!(mailbox.archived_ids(), vec!["a", "b", "c"]);
        assert_eq!(out.metadata.processed_count, 3);
        assert_eq!(out.stage, Stage::Send);
        assert_eq!(out.stage_history().last().copied(), Some(Stage::Send));
    }

    #[tokio::test]
    async fn failed_delivery_marks_nothing() {
        let (services, mailbox, _, _, _, mailer) = services_with(vec![]);
        mailer.fail_digest_sends();

        let stage = SendStage::new(Arc::clone(&services));
        let msg = message_with_batch(&services, &delivery_batch(&["a", "b"]), Stage::Send).await;
        let err = stage.handle(msg).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::DeliveryFailed);
        assert!(!err.retryable);
        for id in ["a", "b"] {
            assert!(!services.processed.is_processed(id).await.unwrap());
        }
        assert!(mailbox.archived_ids().is_empty());
    }

    #[tokio::test]
    async fn archive_failure_is_non_critical() {
        let (services, mailbox, _, _, _, mailer) = services_with(vec![]);
        mailbox.fail_archive(mailbrief_gmail::MockFailure::Network);

        let stage = SendStage::new(Arc::clone(&services));
        let msg = message_with_batch(&services, &delivery_batch(&["a"]), Stage::Send).await;
        let out = stage.handle(msg).await.unwrap();

        assert_eq!(mailer.digests().len(), 1);
        assert!(services.processed.is_processed("a").await.unwrap());
        assert_eq!(out.metadata.processed_count, 1);
    }

    #[tokio::test]
    async fn senders_are_enriched_into_ai_population() {
        let (services, ..) = services_with(vec![]);
        let stage = SendStage::new(Arc::clone(&services));
        let msg = message_with_batch(&services, &delivery_batch(&["a"]), Stage::Send).await;
        stage.handle(msg).await.unwrap();

        let record = services.senders.get("a@example.com").await.unwrap().unwrap();
        assert_eq!(record.class, SenderClass::Ai);
    }

    #[tokio::test]
    async fn empty_summaries_skip_delivery() {
        let (services, _, _, _, _, mailer) = services_with(vec![]);
        let mut batch = DigestBatch::new(Mode::Weekly, None);
        batch.emails = vec![test_email("a", "a@example.com")];
        batch.ai_email_ids = vec!["a".into()];

        let stage = SendStage::new(Arc::clone(&services));
        let msg = message_with_batch(&services, &batch, Stage::Send).await;
        let out = stage.handle(msg).await.unwrap();

        assert!(mailer.digests().is_empty());
        assert_eq!(out.metadata.processed_count, 0);
        assert!(!services.processed.is_processed("a").await.unwrap());
    }

    #[tokio::test]
    async fn marks_in_chunks_of_25() {
        let (services, _, _, _, _, mailer) = services_with(vec![]);
        let ids: Vec<String> = (0..60).map(|i| format!("m{i}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let stage = SendStage::new(Arc::clone(&services));
        let msg = message_with_batch(&services, &delivery_batch(&id_refs), Stage::Send).await;
        let out = stage.handle(msg).await.unwrap();

        assert_eq!(mailer.digests().len(), 1);
        assert_eq!(out.metadata.processed_count, 60);
        for id in &ids {
            assert!(services.processed.is_processed(id).await.unwrap());
        }
    }
}
