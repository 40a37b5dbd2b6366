use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EnrichError;

/// One ranked web search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Query → ranked results.
#[async_trait]
pub trait WebSearch: Send + Sync + std::fmt::Debug {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchResult>, EnrichError>;
}

/// Configuration for the search-API client.
#[derive(Debug, Clone)]
pub struct BraveConfig {
    /// API base, e.g. `https://api.search.brave.com`.
    pub api_base: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

impl BraveConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: "https://api.search.brave.com".to_owned(),
            api_key: api_key.into(),
            timeout_seconds: 15,
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
}

/// HTTP client for a Brave-style web search API.
#[derive(Debug)]
pub struct BraveClient {
    client: reqwest::Client,
    config: BraveConfig,
}

impl BraveClient {
    pub fn new(config: BraveConfig) -> Result<Self, EnrichError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| EnrichError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn parse_results(body: &str) -> Result<Vec<SearchResult>, EnrichError> {
        let response: BraveResponse = serde_json::from_str(body)
            .map_err(|e| EnrichError::Parse(format!("bad search response: {e}")))?;
        Ok(response
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                snippet: r.description,
                url: r.url,
            })
            .collect())
    }
}

#[async_trait]
impl WebSearch for BraveClient {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchResult>, EnrichError> {
        debug!(query, count, "running web search");
        let response = self
            .client
            .get(format!("{}/res/v1/web/search", self.config.api_base))
            .header("X-Subscription-Token", &self.config.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &count.to_string())])
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

        Self::parse_results(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_web_results() {
        let body = r#"{
            "web": {"results": [
                {"title": "Model launch", "description": "A new model", "url": "https://a.example"},
                {"title": "Benchmarks", "description": "Numbers", "url": "https://b.example"}
            ]}
        }"#;
        let results = BraveClient::parse_results(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Model launch");
        assert_eq!(results[1].snippet, "Numbers");
    }

    #[test]
    fn empty_web_section_is_no_results() {
        let results = BraveClient::parse_results("{}").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn malformed_body_is_parse_error() {
        assert!(BraveClient::parse_results("nope").is_err());
    }

    #[tokio::test]
    async fn unreachable_api_is_network_error() {
        let config = BraveConfig::new("bsk-test").with_api_base("http://127.0.0.1:1");
        let client = BraveClient::new(config).unwrap();
        assert!(matches!(
            client.search("ai news", 3).await.unwrap_err(),
            EnrichError::Network(_)
        ));
    }
}
