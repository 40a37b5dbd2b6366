//! The seven stage handlers.
//!
//! Each handler is a pure transformation `PipelineMessage -> PipelineMessage`
//! modulo the injected services: payload in, payload out, counters updated.

pub mod analyze;
pub mod classify;
pub mod critique;
pub mod extract;
pub mod fetch;
pub mod research;
pub mod send;

#[cfg(test)]
pub(crate) mod testsupport;

use std::sync::Arc;

use async_trait::async_trait;

use mailbrief_core::{ErrorCode, PipelineError, PipelineMessage, Stage, now_ms};

use crate::batch::DigestBatch;
use crate::context::Services;

pub use analyze::AnalyzeStage;
pub use classify::ClassifyStage;
pub use critique::CritiqueStage;
pub use extract::ExtractStage;
pub use fetch::FetchStage;
pub use research::ResearchStage;
pub use send::SendStage;

/// One pipeline step.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// The stage this handler implements.
    fn stage(&self) -> Stage;

    /// Transform the incoming message into the next stage's message.
    ///
    /// The last stage returns a finalized message carrying its own stage
    /// marker with the full history.
    async fn handle(&self, msg: PipelineMessage) -> Result<PipelineMessage, PipelineError>;
}

/// Load the batch document out of a message's payload.
pub(crate) async fn load_batch(
    services: &Services,
    msg: &PipelineMessage,
    stage: Stage,
) -> Result<DigestBatch, PipelineError> {
    let value = services
        .payloads()
        .retrieve(&msg.payload)
        .await
        .map_err(|e| PipelineError::from_service(stage, &e))?;
    DigestBatch::from_value(value)
        .map_err(|e| PipelineError::new(ErrorCode::Fatal, stage, format!("bad batch payload: {e}")))
}

/// Store a transformed batch and emit the next envelope.
pub(crate) async fn emit_next(
    services: &Services,
    prev: &PipelineMessage,
    batch: &DigestBatch,
    next: Stage,
) -> Result<PipelineMessage, PipelineError> {
    let value = batch.to_value().map_err(|e| {
        PipelineError::new(
            ErrorCode::Fatal,
            prev.stage,
            format!("batch serialization failed: {e}"),
        )
    })?;
    let payload = services
        .payloads()
        .store(&value, prev.correlation_id, next)
        .await
        .map_err(|e| PipelineError::from_service(prev.stage, &e))?;

    let mut msg = PipelineMessage::from_previous(prev, next, payload, now_ms());
    msg.metadata.cost_so_far = services.cost.total_cost();
    Ok(msg)
}

/// Store the final batch and emit the terminal envelope.
pub(crate) async fn emit_final(
    services: &Services,
    prev: &PipelineMessage,
    batch: &DigestBatch,
) -> Result<PipelineMessage, PipelineError> {
    let value = batch.to_value().map_err(|e| {
        PipelineError::new(
            ErrorCode::Fatal,
            prev.stage,
            format!("batch serialization failed: {e}"),
        )
    })?;
    let payload = services
        .payloads()
        .store(&value, prev.correlation_id, prev.stage)
        .await
        .map_err(|e| PipelineError::from_service(prev.stage, &e))?;

    let mut msg = PipelineMessage::finalize(prev, payload, now_ms());
    msg.metadata.cost_so_far = services.cost.total_cost();
    Ok(msg)
}

/// Build the default handler set in stage order.
#[must_use]
pub fn default_handlers(services: &Arc<Services>) -> Vec<Arc<dyn StageHandler>> {
    vec![
        Arc::new(FetchStage::new(Arc::clone(services))),
        Arc::new(ClassifyStage::new(Arc::clone(services))),
        Arc::new(ExtractStage::new(Arc::clone(services))),
        Arc::new(ResearchStage::new(Arc::clone(services))),
        Arc::new(AnalyzeStage::new(Arc::clone(services))),
        Arc::new(CritiqueStage::new(Arc::clone(services))),
        Arc::new(SendStage::new(Arc::clone(services))),
    ]
}
