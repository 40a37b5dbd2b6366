use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Serialized payloads above this size are offloaded to blob storage.
pub const INLINE_PAYLOAD_LIMIT: usize = 200 * 1024;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Classify,
    Extract,
    Research,
    Analyze,
    Critique,
    Send,
}

/// The fixed stage order of the digest pipeline.
pub const STAGE_ORDER: [Stage; 7] = [
    Stage::Fetch,
    Stage::Classify,
    Stage::Extract,
    Stage::Research,
    Stage::Analyze,
    Stage::Critique,
    Stage::Send,
];

impl Stage {
    /// The stage that follows this one, or `None` after Send.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let idx = STAGE_ORDER.iter().position(|s| *s == self)?;
        STAGE_ORDER.get(idx + 1).copied()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Classify => "classify",
            Self::Extract => "extract",
            Self::Research => "research",
            Self::Analyze => "analyze",
            Self::Critique => "critique",
            Self::Send => "send",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stage's payload lives: inline in the envelope, or offloaded to
/// blob storage when it exceeds [`INLINE_PAYLOAD_LIMIT`].
///
/// The inline-vs-offload decision is purely a size function; consumers
/// never need to know which path was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadReference {
    Inline {
        data: serde_json::Value,
        size_bytes: u64,
    },
    S3 {
        key: String,
        size_bytes: u64,
    },
}

impl PayloadReference {
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::Inline { size_bytes, .. } | Self::S3 { size_bytes, .. } => *size_bytes,
        }
    }

    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline { .. })
    }
}

/// A completed stage transition recorded in the envelope history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: Stage,
    pub started_at_ms: i64,
    pub duration_ms: i64,
    pub success: bool,
}

/// Counters and timing carried alongside the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub email_count: u32,
    pub processed_count: u32,
    pub skipped_count: u32,
    pub error_count: u32,
    pub cost_so_far: f64,
    /// Unix milliseconds when the run started.
    pub start_time: i64,
    /// Unix milliseconds when the current stage began.
    pub current_stage_start_time: i64,
    /// History of completed transitions, oldest first.
    #[serde(default)]
    pub previous_stages: Vec<StageTransition>,
}

impl PipelineMetadata {
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            email_count: 0,
            processed_count: 0,
            skipped_count: 0,
            error_count: 0,
            cost_so_far: 0.0,
            start_time: now_ms,
            current_stage_start_time: now_ms,
            previous_stages: Vec::new(),
        }
    }
}

/// The envelope handed from stage to stage.
///
/// Messages are small: large payloads travel as blob references. One
/// correlation id per run (or sub-batch); the batch id is shared by all
/// sub-batches of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMessage {
    pub correlation_id: Uuid,
    pub batch_id: Uuid,
    pub stage: Stage,
    pub timestamp_ms: i64,
    pub payload: PayloadReference,
    pub metadata: PipelineMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
}

impl PipelineMessage {
    /// Seed message for the first stage of a run.
    #[must_use]
    pub fn new(
        correlation_id: Uuid,
        batch_id: Uuid,
        stage: Stage,
        payload: PayloadReference,
        now_ms: i64,
    ) -> Self {
        Self {
            correlation_id,
            batch_id,
            stage,
            timestamp_ms: now_ms,
            payload,
            metadata: PipelineMetadata::new(now_ms),
            error: None,
        }
    }

    /// Build the next envelope from a completed one.
    ///
    /// The finished stage is appended to `previous_stages` with its runtime,
    /// and the stage clock restarts at `now_ms`.
    #[must_use]
    pub fn from_previous(prev: &Self, next: Stage, payload: PayloadReference, now_ms: i64) -> Self {
        let mut metadata = prev.metadata.clone();
        metadata.previous_stages.push(StageTransition {
            stage: prev.stage,
            started_at_ms: metadata.current_stage_start_time,
            duration_ms: (now_ms - metadata.current_stage_start_time).max(0),
            success: true,
        });
        metadata.current_stage_start_time = now_ms;
        Self {
            correlation_id: prev.correlation_id,
            batch_id: prev.batch_id,
            stage: next,
            timestamp_ms: now_ms,
            payload,
            metadata,
            error: None,
        }
    }

    /// Terminal envelope for the last stage: the finished stage joins the
    /// history but the stage marker stays put.
    #[must_use]
    pub fn finalize(prev: &Self, payload: PayloadReference, now_ms: i64) -> Self {
        Self::from_previous(prev, prev.stage, payload, now_ms)
    }

    /// The sequence of completed stages, oldest first.
    #[must_use]
    pub fn stage_history(&self) -> Vec<Stage> {
        self.metadata
            .previous_stages
            .iter()
            .map(|t| t.stage)
            .collect()
    }
}
