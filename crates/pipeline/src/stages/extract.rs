use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use mailbrief_core::{PipelineError, PipelineMessage, Stage};

use super::{StageHandler, emit_next, load_batch};
use crate::batch::{Article, Enrichment};
use crate::context::Services;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("static regex"))
}

/// Link targets that never carry article content.
const SKIP_MARKERS: [&str; 4] = ["unsubscribe", "mailto:", "/preferences", "list-manage"];

/// Harvest up to `limit` unique article-worthy URLs from an email body.
fn harvest_urls(body: &str, limit: usize) -> Vec<String> {
    let mut seen = Vec::new();
    for m in url_regex().find_iter(body) {
        let url = m.as_str().trim_end_matches(['.', ',', ';']).to_owned();
        let lower = url.to_lowercase();
        if SKIP_MARKERS.iter().any(|marker| lower.contains(marker)) {
            continue;
        }
        if !seen.contains(&url) {
            seen.push(url);
            if seen.len() == limit {
                break;
            }
        }
    }
    seen
}

/// Extract stage: pull URLs out of each AI email and fetch article text
/// for them, best-effort.
pub struct ExtractStage {
    services: Arc<Services>,
}

impl ExtractStage {
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StageHandler for ExtractStage {
    fn stage(&self) -> Stage {
        Stage::Extract
    }

    async fn handle(&self, msg: PipelineMessage) -> Result<PipelineMessage, PipelineError> {
        let services = &self.services;
        let mut batch = load_batch(services, &msg, Stage::Extract).await?;

        let limit = services.config.max_urls_per_email;
        let max_len = services.config.max_article_length;
        let semaphore = Arc::new(Semaphore::new(services.config.extract_concurrency));
        let gate = services.gate();

        // Harvest first so every email carries its URL list even when the
        // article fetches are refused.
        let ai_bodies: Vec<(String, String)> = batch
            .ai_emails()
            .into_iter()
            .map(|e| (e.id.clone(), e.body.clone()))
            .collect();
        let mut work: Vec<(String, String)> = Vec::new();
        for (email_id, body) in &ai_bodies {
            let urls = harvest_urls(body, limit);
            for url in &urls {
                work.push((email_id.clone(), url.clone()));
            }
            batch
                .enrichments
                .entry(email_id.clone())
                .or_default()
                .extracted_urls = urls;
        }

        let futures = work.iter().map(|(email_id, url)| {
            let semaphore = Arc::clone(&semaphore);
            let gate = gate.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let result = gate
                    .call("firecrawl", "scrape", None, services.extractor.extract(url))
                    .await;
                (email_id.clone(), url.clone(), result)
            }
        });
        let results = join_all(futures).await;

        let mut fetched = 0usize;
        for (email_id, url, result) in results {
            match result {
                Ok(content) => {
                    let content: String = content.chars().take(max_len).collect();
                    batch
                        .enrichments
                        .entry(email_id)
                        .or_default()
                        .articles
                        .push(Article { url, content });
                    fetched += 1;
                }
                // Refusals (budget, circuit) and per-URL failures drop the
                // article; the email proceeds with snippet and body.
                Err(e) => {
                    debug!(%url, error = %e, "article extraction skipped");
                    if e.is_budget_refusal() {
                        warn!("extraction budget exhausted, remaining URLs skipped");
                    }
                }
            }
        }

        info!(urls = work.len(), articles = fetched, "extract complete");
        emit_next(services, &msg, &batch, Stage::Research).await
    }
}
