use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mailbrief_core::Mode;

use crate::runner::DigestRunner;

/// Scheduler construction failures.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Cron-driven weekly trigger.
///
/// Fires `run_digest(weekly)` at each cron occurrence; a tick that lands
/// while a run is still in flight is skipped.
pub struct Scheduler {
    runner: Arc<DigestRunner>,
    cron: croner::Cron,
    timezone: chrono_tz::Tz,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        runner: Arc<DigestRunner>,
        cron_expr: &str,
        timezone: &str,
        cancel: CancellationToken,
    ) -> Result<Self, SchedulerError> {
        let cron = croner::Cron::new(cron_expr)
            .parse()
            .map_err(|e| SchedulerError::InvalidCron {
                expr: cron_expr.to_owned(),
                message: format!("{e}"),
            })?;
        let timezone = timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(timezone.to_owned()))?;
        Ok(Self {
            runner,
            cron,
            timezone,
            cancel,
        })
    }

    /// Spawn the scheduling loop.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(timezone = %self.timezone, "scheduler started");
        loop {
            let now = Utc::now().with_timezone(&self.timezone);
            let next = match self.cron.find_next_occurrence(&now, false) {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, "cron has no future occurrence, scheduler stopping");
                    return;
                }
            };

            let wait = (next - now)
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            info!(next = %next, wait_secs = wait.as_secs(), "next scheduled digest");

            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                () = tokio::time::sleep(wait) => {}
            }

            match self.runner.trigger(Mode::Weekly, None, Some("schedule".to_owned())) {
                Ok(execution_id) => {
                    info!(%execution_id, "scheduled weekly digest triggered");
                }
                Err(e) => {
                    warn!(error = %e, "scheduled tick skipped");
                }
            }

            // Step past the occurrence we just fired so the next loop
            // computes the one after it.
            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}
