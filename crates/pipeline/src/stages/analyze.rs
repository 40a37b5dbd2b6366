use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use mailbrief_core::{EmailItem, PipelineError, PipelineMessage, Stage, Summary};
use mailbrief_llm::{ChatRequest, ModelTier, parse_json_response};

use super::{StageHandler, emit_next, load_batch};
use crate::batch::{AnalyzedSummary, Enrichment};
use crate::context::Services;

/// Body text handed to the model per email.
const BODY_PROMPT_LIMIT: usize = 4_000;

const ANALYZE_PROMPT: &str = "You are an AI-industry analyst writing a digest entry for one email. \
Respond with a JSON object: {\"title\": \"...\", \"summary\": \"2-4 sentence analyst \
commentary\", \"key_insights\": [\"2-3 items\"], \"why_it_matters\": \"...\", \
\"action_items\": [\"0-3 items\"], \"category\": \"optional topic label\"}. Ground \
everything in the provided material; do not invent facts.";

#[derive(Debug, Deserialize)]
struct Analysis {
    #[serde(default)]
    title: Option<String>,
    summary: String,
    #[serde(default)]
    key_insights: Vec<String>,
    #[serde(default)]
    why_it_matters: Option<String>,
    #[serde(default)]
    action_items: Vec<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Analyze stage: one quality-tier LLM call per AI email producing a
/// digest summary.
pub struct AnalyzeStage {
    services: Arc<Services>,
}

impl AnalyzeStage {
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn request_for(email: &EmailItem, enrichment: Option<&Enrichment>) -> ChatRequest {
        let mut user = format!(
            "Subject: {}\nFrom: {}\nDate: {}\n\nBody:\n{}",
            email.subject,
            email.sender,
            email.date,
            email.body.chars().take(BODY_PROMPT_LIMIT).collect::<String>(),
        );

        if let Some(enrichment) = enrichment {
            for article in &enrichment.articles {
                let _ = write!(user, "\n\nLinked article ({}):\n{}", article.url, article.content);
            }
            if !enrichment.research.is_empty() {
                user.push_str("\n\nRelated web results:");
                for result in &enrichment.research {
                    let _ = write!(user, "\n- {}: {}", result.title, result.snippet);
                }
            }
        }

        ChatRequest::json(ModelTier::Quality, ANALYZE_PROMPT, user)
    }

    fn summary_from(email: &EmailItem, analysis: Analysis) -> Summary {
        Summary {
            title: analysis
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| email.subject.clone()),
            summary: analysis.summary,
            key_insights: analysis.key_insights,
            why_it_matters: analysis.why_it_matters,
            action_items: analysis.action_items,
            category: analysis.category,
            sender: email.sender.to_string(),
            date: email.date.clone(),
            critique: None,
        }
    }
}

#[async_trait]
impl StageHandler for AnalyzeStage {
    fn stage(&self) -> Stage {
        Stage::Analyze
    }

    async fn handle(&self, msg: PipelineMessage) -> Result<PipelineMessage, PipelineError> {
        let services = &self.services;
        let mut batch = load_batch(services, &msg, Stage::Analyze).await?;
        let gate = services.gate();

        let emails: Vec<EmailItem> = batch.ai_emails().into_iter().cloned().collect();
        let total = emails.len();

        let mut summaries = Vec::with_capacity(total);
        let mut error_count = 0u32;
        let mut skipped = 0u32;

        for (index, email) in emails.iter().enumerate() {
            let request = Self::request_for(email, batch.enrichments.get(&email.id));

            let outcome = gate
                .call("openai", "analyze", None, services.chat.complete(&request))
                .await;

            let content = match outcome {
                Ok(content) => content,
                Err(e) if e.is_budget_refusal() => {
                    // Nothing further can be afforded; what is already
                    // analyzed still ships.
                    skipped += (total - index) as u32;
                    warn!(
                        analyzed = summaries.len(),
                        remaining = total - index,
                        "analyze budget exhausted, stopping early"
                    );
                    break;
                }
                Err(e) => {
                    warn!(email_id = %email.id, error = %e, "analyze call failed, dropping item");
                    error_count += 1;
                    continue;
                }
            };

            // An unparseable answer gets one more try before the item is
            // dropped.
            let analysis = match parse_json_response::<Analysis>(&content) {
                Ok(a) => Ok(a),
                Err(first) => {
                    warn!(email_id = %email.id, error = %first, "analysis unparseable, retrying once");
                    match gate
                        .call("openai", "analyze", None, services.chat.complete(&request))
                        .await
                    {
                        Ok(content) => parse_json_response::<Analysis>(&content),
                        Err(e) => {
                            warn!(email_id = %email.id, error = %e, "analyze retry failed");
                            error_count += 1;
                            continue;
                        }
                    }
                }
            };

            match analysis {
                Ok(analysis) => summaries.push(AnalyzedSummary {
                    email_id: email.id.clone(),
                    summary: Self::summary_from(email, analysis),
                }),
                Err(e) => {
                    warn!(email_id = %email.id, error = %e, "analysis still unparseable, dropping item");
                    error_count += 1;
                }
            }
        }

        info!(
            analyzed = summaries.len(),
            errors = error_count,
            skipped,
            "analyze complete"
        );

        batch.summaries = summaries;
        let mut out = msg;
        out.metadata.error_count += error_count;
        out.metadata.skipped_count += skipped;
        emit_next(services, &out, &batch, Stage::Critique).await
    }
}
