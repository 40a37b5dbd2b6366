use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use crate::error::EnrichError;
use crate::extract::ArticleExtractor;
use crate::search::{SearchResult, WebSearch};

/// Canned article extractor for tests.
#[derive(Debug, Default)]
pub struct MockExtractor {
    articles: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl MockExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `article` for `url`.
    pub fn add_article(&self, url: impl Into<String>, article: impl Into<String>) {
        self.articles.lock().unwrap().insert(url.into(), article.into());
    }

    /// Make every subsequent call fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleExtractor for MockExtractor {
    async fn extract(&self, url: &str) -> Result<String, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EnrichError::Network("mock: extractor down".into()));
        }
        self.articles
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| EnrichError::Api {
                status: 404,
                message: format!("mock: no article for {url}"),
            })
    }
}

/// Canned web search for tests.
#[derive(Debug, Default)]
pub struct MockSearch {
    results: Mutex<Vec<SearchResult>>,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl MockSearch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve these results for every query.
    #[must_use]
    pub fn with_results(results: Vec<SearchResult>) -> Self {
        let mock = Self::new();
        mock.set_results(results);
        mock
    }

    /// Replace the canned result set.
    pub fn set_results(&self, results: Vec<SearchResult>) {
        *self.results.lock().unwrap() = results;
    }

    /// Make every subsequent call fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for MockSearch {
    async fn search(&self, _query: &str, count: u32) -> Result<Vec<SearchResult>, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EnrichError::Network("mock: search down".into()));
        }
        Ok(self
            .results
            .lock()
            .unwrap()
            .iter()
            .take(count as usize)
            .cloned()
            .collect())
    }
}
