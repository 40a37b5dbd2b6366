use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::EnrichError;

/// Turns a URL into the main article text.
#[async_trait]
pub trait ArticleExtractor: Send + Sync + std::fmt::Debug {
    async fn extract(&self, url: &str) -> Result<String, EnrichError>;
}

/// Configuration for the scrape-API client.
#[derive(Debug, Clone)]
pub struct FirecrawlConfig {
    /// API base, e.g. `https://api.firecrawl.dev`.
    pub api_base: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

impl FirecrawlConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: "https://api.firecrawl.dev".to_owned(),
            api_key: api_key.into(),
            timeout_seconds: 30,
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
}

/// HTTP client for a Firecrawl-style scrape API.
#[derive(Debug)]
pub struct FirecrawlClient {
    client: reqwest::Client,
    config: FirecrawlConfig,
}

impl FirecrawlClient {
    pub fn new(config: FirecrawlConfig) -> Result<Self, EnrichError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| EnrichError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn parse_article(body: &str) -> Result<String, EnrichError> {
        let response: ScrapeResponse = serde_json::from_str(body)
            .map_err(|e| EnrichError::Parse(format!("bad scrape response: {e}")))?;
        response
            .data
            .and_then(|d| d.markdown)
            .ok_or_else(|| EnrichError::Parse("scrape response carried no markdown".into()))
    }
}

#[async_trait]
impl ArticleExtractor for FirecrawlClient {
    async fn extract(&self, url: &str) -> Result<String, EnrichError> {
        debug!(url, "extracting article");
        let response = self
            .client
            .post(format!("{}/v1/scrape", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "url": url,
                "formats": ["markdown"],
                "onlyMainContent": true,
            }))
            .send()
            .await
            .map_err(|e| EnrichError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| EnrichError::Network(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(EnrichError::from_status(status, body));
        }

        Self::parse_article(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_markdown_payload() {
        let body = r##"{"success": true, "data": {"markdown": "# Title\n\nBody text"}}"##;
        let article = FirecrawlClient::parse_article(body).unwrap();
        assert!(article.starts_with("# Title"));
    }

    #[test]
    fn missing_markdown_is_parse_error() {
        let body = r#"{"success": true, "data": {}}"#;
        assert!(matches!(
            FirecrawlClient::parse_article(body),
            Err(EnrichError::Parse(_))
        ));
    }

    #[test]
    fn malformed_body_is_parse_error() {
        assert!(FirecrawlClient::parse_article("<html>").is_err());
    }

    #[tokio::test]
    async fn unreachable_api_is_network_error() {
        let config = FirecrawlConfig::new("fc-test").with_api_base("http://127.0.0.1:1");
        let client = FirecrawlClient::new(config).unwrap();
        assert!(matches!(
            client.extract("https://example.com").await.unwrap_err(),
            EnrichError::Network(_)
        ));
    }
}
