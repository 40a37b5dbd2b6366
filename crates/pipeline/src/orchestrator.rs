use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use mailbrief_core::{
    ErrorCode, Mode, PipelineError, PipelineMessage, RunReport, RunWindow, Stage, now_ms,
};
use mailbrief_gmail::validate_window;

use crate::batch::DigestBatch;
use crate::context::Services;
use crate::stages::{StageHandler, default_handlers, load_batch};

/// Drives the seven-stage pipeline: dispatch, retry, timeouts,
/// sub-batching, checkpoints, and the error-handler branch.
pub struct Orchestrator {
    services: Arc<Services>,
    handlers: Vec<Arc<dyn StageHandler>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        let handlers = default_handlers(&services);
        Self {
            services,
            handlers,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token (server shutdown).
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token that cancels in-flight stages.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn handler(&self, stage: Stage) -> &Arc<dyn StageHandler> {
        self.handlers
            .iter()
            .find(|h| h.stage() == stage)
            .expect("all stages registered at construction")
    }

    /// Run a digest for the given mode.
    ///
    /// Returns a report rather than an error: every failure mode is folded
    /// into `{success, message, error}`.
    pub async fn run_digest(&self, mode: Mode, window: Option<RunWindow>) -> RunReport {
        let services = &self.services;
        services.cost.reset();

        if mode == Mode::Historical {
            let Some(ref w) = window else {
                return RunReport::failed(
                    "historical mode requires start and end dates",
                    ErrorCode::Validation.as_str(),
                );
            };
            if let Err(e) = validate_window(w, Utc::now().date_naive()) {
                return RunReport::failed(e.to_string(), ErrorCode::Validation.as_str());
            }
        }

        let started = tokio::time::Instant::now();
        let batch_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        info!(%correlation_id, %batch_id, mode = %mode, "digest run starting");

        // Fetch and classify once over the whole candidate set.
        let seed = match self.seed_message(correlation_id, batch_id, mode, window).await {
            Ok(msg) => msg,
            Err(e) => {
                self.notify_failure(&e).await;
                return RunReport::failed(e.message.clone(), e.code.as_str());
            }
        };

        let classified = {
            let fetched = match self.run_stage(Stage::Fetch, seed).await {
                Ok(msg) => msg,
                Err(e) => return self.fail_run(e).await,
            };
            match self.run_stage(Stage::Classify, fetched).await {
                Ok(msg) => msg,
                Err(e) => return self.fail_run(e).await,
            }
        };

        let batch = match load_batch(services, &classified, Stage::Extract).await {
            Ok(batch) => batch,
            Err(e) => return self.fail_run(e).await,
        };

        if batch.ai_email_ids.is_empty() {
            let message = if batch.already_processed > 0 {
                format!("All {} emails already processed", batch.already_processed)
            } else {
                "No AI-related emails found to process".to_owned()
            };
            info!(%message, "digest run finished with nothing to do");
            return RunReport::empty(message);
        }

        // Sub-batch the AI set: one digest per sub-batch.
        let chunks: Vec<Vec<String>> = if mode == Mode::Weekly {
            vec![batch.ai_email_ids.clone()]
        } else {
            batch
                .ai_email_ids
                .chunks(services.config.cleanup_batch_size)
                .map(<[String]>::to_vec)
                .collect()
        };

        let emails_found = batch.ai_email_ids.len() as u32;
        let total_chunks = chunks.len();
        let mut dispatched = 0u32;
        let mut failed = 0u32;
        let mut processed = 0u32;
        let mut deferred = 0u32;
        let mut first_error: Option<PipelineError> = None;

        for (index, chunk) in chunks.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("run cancelled, remaining sub-batches abandoned");
                deferred += chunk.len() as u32;
                continue;
            }
            if services.cost.should_stop() {
                warn!(
                    total = services.cost.total_cost(),
                    "cost ceiling reached, not launching further sub-batches"
                );
                deferred += chunk.len() as u32;
                continue;
            }
            let launch_cutoff = services.config.run_budget.mul_f64(0.8);
            if started.elapsed() > launch_cutoff {
                warn!(
                    elapsed_secs = started.elapsed().as_secs(),
                    "run budget nearly exhausted, not launching further sub-batches"
                );
                deferred += chunk.len() as u32;
                continue;
            }

            if index > 0 {
                tokio::select! {
                    () = self.cancel.cancelled() => {
                        deferred += chunk.len() as u32;
                        continue;
                    }
                    () = tokio::time::sleep(services.config.inter_batch_delay) => {}
                }
            }

            dispatched += 1;
            match self
                .run_sub_batch(&batch, &chunk, batch_id, &classified)
                .await
            {
                Ok(marked) => processed += marked,
                Err(e) => {
                    failed += 1;
                    error!(error = %e, "sub-batch failed");
                    self.notify_failure(&e).await;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let report = match first_error {
            Some(e) if failed == dispatched => RunReport {
                success: false,
                emails_found,
                emails_processed: processed,
                batches: dispatched,
                message: e.message.clone(),
                error: Some(e.code.as_str().to_owned()),
            },
            _ => {
                let mut message = format!(
                    "Processed {processed} emails across {dispatched} batch(es)"
                );
                if deferred > 0 {
                    message.push_str(&format!(", {deferred} emails deferred to the next run"));
                }
                RunReport {
                    success: true,
                    emails_found,
                    emails_processed: processed,
                    batches: dispatched,
                    message,
                    error: None,
                }
            }
        };
        info!(
            processed = report.emails_processed,
            batches = report.batches,
            success = report.success,
            total_chunks,
            "digest run finished"
        );
        report
    }

    /// Run one sub-batch from Extract through Send; returns the number of
    /// emails marked processed.
    async fn run_sub_batch(
        &self,
        batch: &DigestBatch,
        chunk: &[String],
        batch_id: Uuid,
        classified: &PipelineMessage,
    ) -> Result<u32, PipelineError> {
        let services = &self.services;
        let correlation_id = Uuid::new_v4();
        let sub_batch = batch.restricted_to(chunk);

        let value = sub_batch.to_value().map_err(|e| {
            PipelineError::new(
                ErrorCode::Fatal,
                Stage::Extract,
                format!("sub-batch serialization failed: {e}"),
            )
        })?;
        let payload = services
            .payloads()
            .store(&value, correlation_id, Stage::Extract)
            .await
            .map_err(|e| PipelineError::from_service(Stage::Extract, &e))?;

        // A fresh correlation id per sub-batch; the batch id and the
        // fetch/classify history are shared.
        let now = now_ms();
        let mut metadata = classified.metadata.clone();
        metadata.current_stage_start_time = now;
        let mut msg = PipelineMessage {
            correlation_id,
            batch_id,
            stage: Stage::Extract,
            timestamp_ms: now,
            payload,
            metadata,
            error: None,
        };
        info!(%correlation_id, emails = chunk.len(), "sub-batch dispatched");

        for stage in [
            Stage::Extract,
            Stage::Research,
            Stage::Analyze,
            Stage::Critique,
            Stage::Send,
        ] {
            msg = self.run_stage(stage, msg).await?;
        }
        Ok(msg.metadata.processed_count)
    }

    /// Run one stage with retry, timeout, cancellation, and a checkpoint
    /// on success.
    async fn run_stage(
        &self,
        stage: Stage,
        msg: PipelineMessage,
    ) -> Result<PipelineMessage, PipelineError> {
        let services = &self.services;
        let handler = self.handler(stage);
        let max_attempts = services.config.retry.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Err(PipelineError::new(
                    ErrorCode::Fatal,
                    stage,
                    "run cancelled, partial stage output discarded",
                ));
            }
            let outcome = tokio::select! {
                () = self.cancel.cancelled() => {
                    return Err(PipelineError::new(
                        ErrorCode::Fatal,
                        stage,
                        "run cancelled, partial stage output discarded",
                    ));
                }
                result = tokio::time::timeout(
                    services.config.stage_timeout,
                    handler.handle(msg.clone()),
                ) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(PipelineError::new(
                        ErrorCode::TransientNetwork,
                        stage,
                        format!(
                            "stage timed out after {}s",
                            services.config.stage_timeout.as_secs()
                        ),
                    )),
                },
            };

            match outcome {
                Ok(out) => {
                    services
                        .payloads()
                        .write_checkpoint(
                            msg.correlation_id,
                            stage,
                            &json!({
                                "correlation_id": msg.correlation_id,
                                "batch_id": msg.batch_id,
                                "completed_stage": stage,
                                "timestamp_ms": now_ms(),
                                "metadata": out.metadata,
                            }),
                        )
                        .await;
                    return Ok(out);
                }
                Err(e) if e.retryable && attempt < max_attempts => {
                    let delay = services
                        .config
                        .retry
                        .strategy
                        .delay_for(attempt)
                        .min(services.config.stage_timeout);
                    warn!(
                        stage = %stage,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "stage failed, retrying"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            return Err(PipelineError::new(
                                ErrorCode::Fatal,
                                stage,
                                "run cancelled during retry backoff",
                            ));
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Terminal failure of the shared fetch/classify phase.
    async fn fail_run(&self, error: PipelineError) -> RunReport {
        error!(error = %error, "digest run failed before sub-batching");
        self.notify_failure(&error).await;
        RunReport::failed(error.message.clone(), error.code.as_str())
    }

    /// The error-handler branch: notifications only, never a
    /// processed-store write.
    async fn notify_failure(&self, error: &PipelineError) {
        let recipient = &self.services.config.recipient;
        if error.code == ErrorCode::AuthInvalid {
            if let Err(e) = self.services.mailer.send_reauth_notice(recipient).await {
                warn!(error = %e, "failed to send re-auth notice");
            }
        }
        let context = format!("{} stage", error.stage);
        if let Err(e) = self
            .services
            .mailer
            .send_error_notice(recipient, &context, error)
            .await
        {
            warn!(error = %e, "failed to send error notice");
        }
    }

    async fn seed_message(
        &self,
        correlation_id: Uuid,
        batch_id: Uuid,
        mode: Mode,
        window: Option<RunWindow>,
    ) -> Result<PipelineMessage, PipelineError> {
        let batch = DigestBatch::new(mode, window);
        let value = batch.to_value().map_err(|e| {
            PipelineError::new(
                ErrorCode::Fatal,
                Stage::Fetch,
                format!("seed serialization failed: {e}"),
            )
        })?;
        let payload = self
            .services
            .payloads()
            .store(&value, correlation_id, Stage::Fetch)
            .await
            .map_err(|e| PipelineError::from_service(Stage::Fetch, &e))?;
        Ok(PipelineMessage::new(
            correlation_id,
            batch_id,
            Stage::Fetch,
            payload,
            now_ms(),
        ))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
