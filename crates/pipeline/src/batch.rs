use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use mailbrief_core::{EmailItem, Mode, RunWindow, Summary};
use mailbrief_enrich::SearchResult;

/// Extracted article text for one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub content: String,
}

/// External context gathered for one email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default)]
    pub extracted_urls: Vec<String>,
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(default)]
    pub research: Vec<SearchResult>,
}

/// A summary paired with the email it came from, so the Send stage can
/// mark and archive the right ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedSummary {
    pub email_id: String,
    pub summary: Summary,
}

/// The document each stage transforms; travels as the envelope payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestBatch {
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<RunWindow>,

    /// Candidate emails still in play. Fetch fills this; Classify trims it
    /// to the AI set.
    #[serde(default)]
    pub emails: Vec<EmailItem>,

    /// Ids whose senders were already known AI at fetch time.
    #[serde(default)]
    pub known_ai_ids: Vec<String>,
    /// Ids whose senders were unknown and need classification.
    #[serde(default)]
    pub unknown_ids: Vec<String>,
    /// Emails dropped at fetch because the sender was known non-AI.
    #[serde(default)]
    pub known_non_ai: u32,
    /// Emails dropped at fetch because they were already processed.
    #[serde(default)]
    pub already_processed: u32,

    /// The AI set: union of known AI and newly classified AI ids.
    #[serde(default)]
    pub ai_email_ids: Vec<String>,

    /// Per-email external context, keyed by email id.
    #[serde(default)]
    pub enrichments: HashMap<String, Enrichment>,

    /// Analyze output, critiqued in place by the Critique stage.
    #[serde(default)]
    pub summaries: Vec<AnalyzedSummary>,
}

impl DigestBatch {
    /// An empty batch for the start of a run.
    #[must_use]
    pub fn new(mode: Mode, window: Option<RunWindow>) -> Self {
        Self {
            mode,
            window,
            emails: Vec::new(),
            known_ai_ids: Vec::new(),
            unknown_ids: Vec::new(),
            known_non_ai: 0,
            already_processed: 0,
            ai_email_ids: Vec::new(),
            enrichments: HashMap::new(),
            summaries: Vec::new(),
        }
    }

    /// The emails in the AI set, in batch order.
    #[must_use]
    pub fn ai_emails(&self) -> Vec<&EmailItem> {
        self.emails
            .iter()
            .filter(|e| self.ai_email_ids.contains(&e.id))
            .collect()
    }

    /// Look up an email by id.
    #[must_use]
    pub fn email(&self, id: &str) -> Option<&EmailItem> {
        self.emails.iter().find(|e| e.id == id)
    }

    /// Restrict the batch to a subset of AI email ids (sub-batching).
    ///
    /// Keeps only the named emails, their enrichments, and their
    /// summaries; fetch-time counters are preserved.
    #[must_use]
    pub fn restricted_to(&self, ids: &[String]) -> Self {
        let mut sub = self.clone();
        sub.ai_email_ids = ids.to_vec();
        sub.emails.retain(|e| ids.contains(&e.id));
        sub.enrichments.retain(|id, _| ids.contains(id));
        sub.summaries.retain(|s| ids.contains(&s.email_id));
        sub
    }

    /// Serialize for the payload manager.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Deserialize from a retrieved payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailbrief_core::EmailSender;

    fn email(id: &str) -> EmailItem {
        EmailItem {
            id: id.to_owned(),
            thread_id: format!("t-{id}"),
            sender: EmailSender::parse(&format!("{id}@example.com")),
            subject: format!("subject {id}"),
            date: "2024-06-01T00:00:00+00:00".into(),
            snippet: "snippet".into(),
            body: "body".into(),
            labels: vec![],
        }
    }

    #[test]
    fn round_trips_through_json() {
        let mut batch = DigestBatch::new(Mode::Weekly, None);
        batch.emails = vec![email("a"), email("b")];
        batch.ai_email_ids = vec!["a".into()];
        batch.enrichments.insert("a".into(), Enrichment::default());

        let value = batch.to_value().unwrap();
        let restored = DigestBatch::from_value(value).unwrap();
        assert_eq!(restored.emails.len(), 2);
        assert_eq!(restored.ai_email_ids, vec!["a"]);
        assert!(restored.enrichments.contains_key("a"));
    }

    #[test]
    fn ai_emails_filters_by_id() {
        let mut batch = DigestBatch::new(Mode::Weekly, None);
        batch.emails = vec![email("a"), email("b"), email("c")];
        batch.ai_email_ids = vec!["a".into(), "c".into()];
        let ai: Vec<&str> = batch.ai_emails().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ai, vec!["a", "c"]);
    }

    #[test]
    fn restriction_trims_everything_consistently() {
        let mut batch = DigestBatch::new(Mode::Cleanup, None);
        batch.emails = vec![email("a"), email("b"), email("c")];
        batch.ai_email_ids = vec!["a".into(), "b".into(), "c".into()];
        batch.enrichments.insert("a".into(), Enrichment::default());
        batch.enrichments.insert("b".into(), Enrichment::default());
        batch.already_processed = 4;

        let sub = batch.restricted_to(&["b".into()]);
        assert_eq!(sub.ai_email_ids, vec!["b"]);
        assert_eq!(sub.emails.len(), 1);
        assert!(sub.enrichments.contains_key("b"));
        assert!(!sub.enrichments.contains_key("a"));
        assert_eq!(sub.already_processed, 4);
    }
}
