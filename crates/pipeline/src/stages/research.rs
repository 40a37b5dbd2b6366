use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use mailbrief_core::{PipelineError, PipelineMessage, Stage};

use super::{StageHandler, emit_next, load_batch};
use crate::context::Services;

/// Build a search query from an email subject.
///
/// Strips reply/forward prefixes and clamps the length so the query stays
/// a headline, not a paragraph.
fn query_from_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let mut stripped = false;
        for prefix in ["re:", "fwd:", "fw:"] {
            if s.len() >= prefix.len()
                && s.is_char_boundary(prefix.len())
                && s[..prefix.len()].eq_ignore_ascii_case(prefix)
            {
                s = s[prefix.len()..].trim_start();
                stripped = true;
            }
        }
        if !stripped {
            break;
        }
    }
    s.chars().take(120).collect()
}

/// Research stage: one web search per AI email, best-effort.
pub struct ResearchStage {
    services: Arc<Services>,
}

impl ResearchStage {
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StageHandler for ResearchStage {
    fn stage(&self) -> Stage {
        Stage::Research
    }

    async fn handle(&self, msg: PipelineMessage) -> Result<PipelineMessage, PipelineError> {
        let services = &self.services;
        let mut batch = load_batch(services, &msg, Stage::Research).await?;

        let count = services.config.search_results_per_email;
        let gate = services.gate();

        let subjects: Vec<(String, String)> = batch
            .ai_emails()
            .into_iter()
            .map(|e| (e.id.clone(), e.subject.clone()))
            .collect();

        let mut researched = 0usize;
        for (email_id, subject) in subjects {
            let query = query_from_subject(&subject);
            if query.is_empty() {
                continue;
            }
            match gate
                .call("brave", "search", None, services.search.search(&query, count))
                .await
            {
                Ok(results) => {
                    researched += 1;
                    batch
                        .enrichments
                        .entry(email_id)
                        .or_default()
                        .research = results;
                }
                // Research is best-effort: a refusal or outage leaves the
                // emails unchanged, and a refusal ends the loop since every
                // further call would be refused too.
                Err(e) if e.is_budget_refusal() || e.is_circuit_open() => {
                    warn!(error = %e, "research unavailable, continuing without it");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, %query, "search failed for one email");
                }
            }
        }

        info!(researched, "research complete");
        emit_next(services, &msg, &batch, Stage::Analyze).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DigestBatch;
    use crate::stages::testsupport::{message_with_batch, services_with, test_email};
    use mailbrief_core::Mode;
    use mailbrief_enrich::SearchResult;

    fn ai_batch(ids: &[&str]) -> DigestBatch {
        let mut batch = DigestBatch::new(Mode::Weekly, None);
        batch.emails = ids
            .iter()
            .map(|id| test_email(id, &format!("{id}@example.com")))
            .collect();
        batch.ai_email_ids = ids.iter().map(ToString::to_string).collect();
        batch
    }

    fn results(n: usize) -> Vec<SearchResult> {
        (0..n)
            .map(|i| SearchResult {
                title: format!("result {i}"),
                snippet: format!("snippet {i}"),
                url: format!("https://r{i}.example"),
            })
            .collect()
    }

    #[test]
    fn strips_reply_prefixes() {
        assert_eq!(query_from_subject("Re: Fwd: GPT-5 launch"), "GPT-5 launch");
        assert_eq!(query_from_subject("  FW: benchmarks  "), "benchmarks");
        assert_eq!(query_from_subject("plain subject"), "plain subject");
    }

    #[test]
    fn clamps_query_length() {
        let long = "x".repeat(500);
        assert_eq!(query_from_subject(&long).len(), 120);
    }

    #[tokio::test]
    async fn attaches_search_results_per_email() {
        let (services, _, _, _, search, _) = services_with(vec![]);
        search.set_results(results(5));

        let stage = ResearchStage::new(Arc::clone(&services));
        let msg = message_with_batch(&services, &ai_batch(&["a", "b"]), Stage::Research).await;
        let out = stage.handle(msg).await.unwrap();

        let batch = load_batch(&services, &out, Stage::Analyze).await.unwrap();
        // Capped at the configured per-email count.
        assert_eq!(batch.enrichments["a"].research.len(), 3);
        assert_eq!(batch.enrichments["b"].research.len(), 3);
        assert_eq!(search.call_count(), 2);
    }

    #[tokio::test]
    async fn outage_returns_emails_unchanged() {
        let (services, _, _, _, search, _) = services_with(vec![]);
        search.fail();
        // Trip the brave breaker so the first call is refused outright.
        let breaker = services.breakers.get("brave");
        for _ in 0..5 {
            breaker.record_failure();
        }

        let stage = ResearchStage::new(Arc::clone(&services));
        let msg = message_with_batch(&services, &ai_batch(&["a"]), Stage::Research).await;
        let out = stage.handle(msg).await.unwrap();

        assert_eq!(search.call_count(), 0);
        let batch = load_batch(&services, &out, Stage::Analyze).await.unwrap();
        assert!(
            batch
                .enrichments
                .get("a")
                .map_or(true, |e| e.research.is_empty())
        );
        assert_eq!(batch.ai_email_ids, vec!["a"]);
    }

    #[tokio::test]
    async fn per_email_failure_does_not_stop_the_rest() {
        let (services, _, _, _, search, _) = services_with(vec![]);
        // The mock fails every call at transport level (not a refusal), so
        // each email is attempted and skipped.
        search.fail();

        let stage = ResearchStage::new(Arc::clone(&services));
        let msg = message_with_batch(&services, &ai_batch(&["a", "b"]), Stage::Research).await;
        let out = stage.handle(msg).await.unwrap();

        assert_eq!(search.call_count(), 2);
        let batch = load_batch(&services, &out, Stage::Analyze).await.unwrap();
        assert_eq!(batch.ai_email_ids.len(), 2);
    }
}
