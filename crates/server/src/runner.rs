use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{error, info};

use mailbrief_core::{Mode, RunWindow};
use mailbrief_pipeline::Orchestrator;

use crate::executions::ExecutionRegistry;

/// Why a trigger was refused.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// A run is already in flight; the stores and cost tracker are
    /// per-process, so runs never overlap.
    #[error("a digest run is already in progress")]
    AlreadyRunning,
}

/// Launches digest runs as background tasks, one at a time.
pub struct DigestRunner {
    orchestrator: Arc<Orchestrator>,
    executions: Arc<ExecutionRegistry>,
    in_flight: Arc<AtomicBool>,
}

impl DigestRunner {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, executions: Arc<ExecutionRegistry>) -> Self {
        Self {
            orchestrator,
            executions,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a run is currently executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start a run in the background and return its execution id.
    pub fn trigger(
        &self,
        mode: Mode,
        window: Option<RunWindow>,
        triggered_by: Option<String>,
    ) -> Result<String, TriggerError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TriggerError::AlreadyRunning);
        }

        let input = serde_json::json!({
            "mode": mode,
            "window": window,
            "triggeredBy": triggered_by,
        });
        let execution_id = self.executions.start(format!("digest-{mode}"), input);

        let orchestrator = Arc::clone(&self.orchestrator);
        let executions = Arc::clone(&self.executions);
        let in_flight = Arc::clone(&self.in_flight);
        let id = execution_id.clone();
        tokio::spawn(async move {
            info!(execution_id = %id, mode = %mode, "digest run launched");
            let report = orchestrator.run_digest(mode, window).await;
            if report.success {
                info!(execution_id = %id, processed = report.emails_processed, "digest run succeeded");
            } else {
                error!(execution_id = %id, error = ?report.error, "digest run failed");
            }
            executions.finish(&id, &report);
            in_flight.store(false, Ordering::SeqCst);
        });

        Ok(execution_id)
    }
}

impl std::fmt::Debug for DigestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestRunner")
            .field("in_flight", &self.is_running())
            .finish_non_exhaustive()
    }
}
