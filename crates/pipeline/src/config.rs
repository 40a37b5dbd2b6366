use std::time::Duration;

use crate::retry::RetryStrategy;

/// Retry policy applied to each stage invocation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first (2 retries beyond the initial).
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::default(),
        }
    }
}

/// Tunables for a digest run.
///
/// Defaults carry the production limits; tests shrink the delays.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Digest recipient address.
    pub recipient: String,
    /// The digest's own sending address, hard-excluded from sender
    /// populations to avoid a feedback loop on prior digests.
    pub own_address: String,

    /// Hard dollar ceiling per run.
    pub max_cost_per_run: f64,
    /// AI emails per sub-batch in cleanup/historical modes.
    pub cleanup_batch_size: usize,
    /// Delay between sub-batch dispatches.
    pub inter_batch_delay: Duration,
    /// Result cap for weekly/historical searches.
    pub max_emails_per_run: u32,
    /// Result cap for the unbounded cleanup search.
    pub cleanup_scan_cap: u32,
    /// Processed-store batch-write size.
    pub processed_write_batch: usize,

    /// Base LLM batch size; classify sub-groups are `min(50, 2x)` this.
    pub openai_batch_size: usize,
    /// Concurrent classify sub-group calls.
    pub classify_concurrency: usize,
    /// Stagger between classify sub-group starts.
    pub classify_stagger: Duration,

    /// URLs harvested per email.
    pub max_urls_per_email: usize,
    /// Article text truncation length.
    pub max_article_length: usize,
    /// Concurrent article fetches.
    pub extract_concurrency: usize,
    /// Search results attached per email.
    pub search_results_per_email: u32,

    /// Serialized payloads above this size offload to blob storage.
    pub inline_payload_limit: usize,

    /// Hard timeout per stage invocation.
    pub stage_timeout: Duration,
    /// Cumulative run budget; past 80% no new sub-batches launch.
    pub run_budget: Duration,

    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            own_address: String::new(),
            max_cost_per_run: 1.0,
            cleanup_batch_size: 50,
            inter_batch_delay: Duration::from_secs(5),
            max_emails_per_run: 500,
            cleanup_scan_cap: 2_000,
            processed_write_batch: 25,
            openai_batch_size: 25,
            classify_concurrency: 3,
            classify_stagger: Duration::from_millis(200),
            max_urls_per_email: 5,
            max_article_length: 5_000,
            extract_concurrency: 5,
            search_results_per_email: 3,
            inline_payload_limit: mailbrief_core::INLINE_PAYLOAD_LIMIT,
            stage_timeout: Duration::from_secs(900),
            run_budget: Duration::from_secs(900),
            retry: RetryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Classify sub-group size: `min(50, 2 x openai_batch_size)`.
    #[must_use]
    pub fn classify_group_size(&self) -> usize {
        (self.openai_batch_size * 2).min(50).max(1)
    }
}
