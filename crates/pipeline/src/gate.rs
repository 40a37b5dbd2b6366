use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use mailbrief_core::{CostRefusal, CostTracker, ErrorCode, ServiceError};

use crate::breaker::{BreakerRegistry, CircuitOpenError};

/// Failure of a gated service call.
#[derive(Debug, Error)]
pub enum GateError {
    /// The cost tracker refused the call.
    #[error(transparent)]
    Refused(#[from] CostRefusal),

    /// The circuit for the service is open.
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// The call went through and failed.
    #[error("{message}")]
    Service { code: ErrorCode, message: String },
}

impl GateError {
    /// The pipeline error code for this failure.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Refused(e) => e.error_code(),
            Self::Open(e) => e.error_code(),
            Self::Service { code, .. } => *code,
        }
    }

    /// Whether this failure was a budget refusal (call never made).
    #[must_use]
    pub fn is_budget_refusal(&self) -> bool {
        matches!(self, Self::Refused(_))
    }

    /// Whether this failure was a breaker refusal (call never made).
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

/// The chokepoint for every outbound service call.
///
/// A call is admitted only when the cost tracker can afford it and the
/// service's circuit is not open; the outcome is fed back into both.
#[derive(Debug, Clone)]
pub struct ServiceGate {
    cost: Arc<CostTracker>,
    breakers: Arc<BreakerRegistry>,
}

impl ServiceGate {
    #[must_use]
    pub fn new(cost: Arc<CostTracker>, breakers: Arc<BreakerRegistry>) -> Self {
        Self { cost, breakers }
    }

    /// Run a service call through budget and breaker checks.
    ///
    /// `estimated` overrides the default pricing-table cost for the
    /// affordability check; the same figure is recorded on success.
    pub async fn call<T, E, F>(
        &self,
        service: &str,
        operation: &str,
        estimated: Option<f64>,
        fut: F,
    ) -> Result<T, GateError>
    where
        E: ServiceError,
        F: Future<Output = Result<T, E>>,
    {
        let estimated = estimated.unwrap_or_else(|| CostTracker::default_cost(service, operation));
        self.cost.check(service, estimated)?;

        let breaker = self.breakers.get(service);
        breaker.try_acquire()?;

        match fut.await {
            Ok(value) => {
                breaker.record_success();
                let cost = self.cost.record_api_call(service, operation, Some(estimated));
                debug!(service, operation, cost, "service call succeeded");
                Ok(value)
            }
            Err(err) => {
                breaker.record_failure();
                Err(GateError::Service {
                    code: err.error_code(),
                    message: err.to_string(),
                })
            }
        }
    }
}
