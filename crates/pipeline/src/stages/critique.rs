use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use mailbrief_core::{PipelineError, PipelineMessage, Stage, Summary};
use mailbrief_llm::{ChatRequest, ModelTier};

use super::{StageHandler, emit_next, load_batch};
use crate::context::Services;

const CRITIQUE_PROMPT: &str = "You are a contrarian AI-industry critic. Given a digest summary, write a \
2-3 sentence critique that pushes back on the hype: what is overstated, what is \
missing, or what could go wrong. Respond with the critique text only, no preamble.";

/// Critique stage: append a contrarian take to each summary, mini tier.
///
/// Failures fall through; the summary ships uncritiqued.
pub struct CritiqueStage {
    services: Arc<Services>,
}

impl CritiqueStage {
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn request_for(summary: &Summary) -> ChatRequest {
        let mut user = format!("Title: {}\nSummary: {}", summary.title, summary.summary);
        if !summary.key_insights.is_empty() {
            user.push_str("\nKey insights: ");
            user.push_str(&summary.key_insights.join("; "));
        }
        ChatRequest::text(ModelTier::Mini, CRITIQUE_PROMPT, user).with_max_tokens(256)
    }
}

#[async_trait]
impl StageHandler for CritiqueStage {
    fn stage(&self) -> Stage {
        Stage::Critique
    }

    async fn handle(&self, msg: PipelineMessage) -> Result<PipelineMessage, PipelineError> {
        let services = &self.services;
        let mut batch = load_batch(services, &msg, Stage::Critique).await?;
        let gate = services.gate();

        let mut critiqued = 0usize;
        for item in &mut batch.summaries {
            let request = Self::request_for(&item.summary);
            match gate
                .call("openai", "critique", None, services.chat.complete(&request))
                .await
            {
                Ok(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        item.summary.critique = Some(text.to_owned());
                        critiqued += 1;
                    }
                }
                // Best-effort: a refusal stops the loop (every further
                // call would be refused), any other failure just leaves
                // this summary unchanged.
                Err(e) if e.is_budget_refusal() => {
                    warn!(error = %e, "critique budget exhausted, remaining summaries uncritiqued");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, title = %item.summary.title, "critique failed, falling through");
                }
            }
        }

        info!(critiqued, total = batch.summaries.len(), "critique complete");
        emit_next(services, &msg, &batch, Stage::Send).await
    }
}
