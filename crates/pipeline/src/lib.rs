pub mod batch;
pub mod breaker;
pub mod config;
pub mod context;
pub mod gate;
pub mod orchestrator;
pub mod payload;
pub mod retry;
pub mod stages;

pub use batch::{AnalyzedSummary, Article, DigestBatch, Enrichment};
pub use breaker::{BreakerConfig, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use config::{PipelineConfig, RetryConfig};
pub use context::Services;
pub use gate::{GateError, ServiceGate};
pub use orchestrator::Orchestrator;
pub use payload::{PayloadError, PayloadManager};
pub use retry::RetryStrategy;
