pub mod cost;
pub mod digest;
pub mod envelope;
pub mod error;
pub mod processed;
pub mod sender;
pub mod types;

pub use cost::{ApiCost, CostRefusal, CostTracker, MAX_COST_PER_RUN};
pub use digest::{DigestOutput, DigestStats, Summary};
pub use envelope::{
    INLINE_PAYLOAD_LIMIT, PayloadReference, PipelineMessage, PipelineMetadata, STAGE_ORDER, Stage,
    StageTransition,
};
pub use error::{ErrorCode, PipelineError, ServiceError};
pub use processed::{PROCESSED_TTL_DAYS, ProcessedRecord, TokenRecord};
pub use sender::{DECAY_RATE_PER_DAY, KNOWN_CONFIDENCE_FLOOR, SenderClass, SenderRecord};
pub use types::{EmailItem, EmailSender, Mode, RunReport, RunWindow};

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
