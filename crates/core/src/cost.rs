use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ServiceError};

/// Hard dollar ceiling per digest run.
pub const MAX_COST_PER_RUN: f64 = 1.0;

/// Fraction of the ceiling at which the tracker reports "approaching".
const APPROACHING_FRACTION: f64 = 0.8;

/// One recorded outbound API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCost {
    pub service: String,
    pub operation: String,
    pub cost: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Default)]
struct Ledger {
    calls: Vec<ApiCost>,
    total: f64,
    counts: HashMap<(String, String), u32>,
    service_counts: HashMap<String, u32>,
}

/// Refusal returned when a call would breach the budget or a call cap.
#[derive(Debug, thiserror::Error)]
pub enum CostRefusal {
    #[error("run budget exhausted: {total:.4} + {estimated:.4} would exceed {max:.2}")]
    BudgetExhausted { total: f64, estimated: f64, max: f64 },
    #[error("call cap reached for {service}: {cap} calls")]
    CallCapReached { service: String, cap: u32 },
}

impl ServiceError for CostRefusal {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::BudgetExceeded
    }
}

/// Per-run ledger of estimated dollar spend.
///
/// Every outbound call in the pipeline passes through this tracker before
/// invocation; calls that would breach [`MAX_COST_PER_RUN`] or a per-service
/// call cap are refused. Shared process-wide, safe for concurrent use.
#[derive(Debug)]
pub struct CostTracker {
    max_cost: f64,
    caps: HashMap<String, u32>,
    inner: Mutex<Ledger>,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new(MAX_COST_PER_RUN)
    }
}

impl CostTracker {
    #[must_use]
    pub fn new(max_cost: f64) -> Self {
        let caps = [("openai", 50u32), ("firecrawl", 100), ("brave", 30)]
            .into_iter()
            .map(|(s, c)| (s.to_owned(), c))
            .collect();
        Self {
            max_cost,
            caps,
            inner: Mutex::new(Ledger::default()),
        }
    }

    /// Override the call cap for a service.
    #[must_use]
    pub fn with_call_cap(mut self, service: &str, cap: u32) -> Self {
        self.caps.insert(service.to_owned(), cap);
        self
    }

    /// Default cost table for calls that do not supply an estimate.
    #[must_use]
    pub fn default_cost(service: &str, operation: &str) -> f64 {
        match (service, operation) {
            ("openai", "classify" | "analyze" | "critique") => 0.02,
            // Anything else against the LLM is assumed to be a large-model call.
            ("openai", _) => 0.5,
            ("firecrawl", _) => 0.01,
            ("brave", _) => 0.003,
            _ => 0.0,
        }
    }

    /// Per-service call cap, where one applies.
    #[must_use]
    pub fn call_cap(&self, service: &str) -> Option<u32> {
        self.caps.get(service).copied()
    }

    /// Record a completed call and return the cost that was applied.
    pub fn record_api_call(&self, service: &str, operation: &str, cost: Option<f64>) -> f64 {
        let cost = cost.unwrap_or_else(|| Self::default_cost(service, operation));
        let mut ledger = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        ledger.calls.push(ApiCost {
            service: service.to_owned(),
            operation: operation.to_owned(),
            cost,
            timestamp_ms: crate::now_ms(),
        });
        ledger.total += cost;
        *ledger
            .counts
            .entry((service.to_owned(), operation.to_owned()))
            .or_insert(0) += 1;
        *ledger.service_counts.entry(service.to_owned()).or_insert(0) += 1;
        cost
    }

    /// Whether a call with the given estimated cost fits under the ceiling.
    #[must_use]
    pub fn can_afford(&self, estimated: f64) -> bool {
        let ledger = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        ledger.total + estimated <= self.max_cost
    }

    /// Gate an upcoming call against both the ceiling and the service cap.
    pub fn check(&self, service: &str, estimated: f64) -> Result<(), CostRefusal> {
        let ledger = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if ledger.total + estimated > self.max_cost {
            return Err(CostRefusal::BudgetExhausted {
                total: ledger.total,
                estimated,
                max: self.max_cost,
            });
        }
        if let Some(cap) = self.call_cap(service) {
            let used = ledger.service_counts.get(service).copied().unwrap_or(0);
            if used >= cap {
                return Err(CostRefusal::CallCapReached {
                    service: service.to_owned(),
                    cap,
                });
            }
        }
        Ok(())
    }

    /// True once spend passes 80% of the ceiling.
    #[must_use]
    pub fn is_approaching_limit(&self) -> bool {
        self.total_cost() > APPROACHING_FRACTION * self.max_cost
    }

    /// True once spend meets or exceeds the ceiling. Checked by the
    /// orchestrator at stage boundaries.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.total_cost() >= self.max_cost
    }

    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .total
    }

    #[must_use]
    pub fn call_count(&self, service: &str, operation: &str) -> u32 {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .counts
            .get(&(service.to_owned(), operation.to_owned()))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn service_call_count(&self, service: &str) -> u32 {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .service_counts
            .get(service)
            .copied()
            .unwrap_or(0)
    }

    /// All recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCost> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .calls
            .clone()
    }

    /// Clear the ledger for a new run.
    pub fn reset(&self) {
        let mut ledger = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *ledger = Ledger::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pricing_table() {
        assert!((CostTracker::default_cost("openai", "classify") - 0.02).abs() < f64::EPSILON);
        assert!((CostTracker::default_cost("openai", "analyze") - 0.02).abs() < f64::EPSILON);
        assert!((CostTracker::default_cost("openai", "critique") - 0.02).abs() < f64::EPSILON);
        assert!((CostTracker::default_cost("openai", "chat") - 0.5).abs() < f64::EPSILON);
        assert!((CostTracker::default_cost("firecrawl", "scrape") - 0.01).abs() < f64::EPSILON);
        assert!((CostTracker::default_cost("brave", "search") - 0.003).abs() < f64::EPSILON);
        assert!(CostTracker::default_cost("gmail", "list").abs() < f64::EPSILON);
        assert!(CostTracker::default_cost("resend", "send").abs() < f64::EPSILON);
    }

    #[test]
    fn records_accumulate() {
        let tracker = CostTracker::default();
        tracker.record_api_call("openai", "classify", None);
        tracker.record_api_call("openai", "classify", None);
        tracker.record_api_call("brave", "search", Some(0.005));

        assert!((tracker.total_cost() - 0.045).abs() < 1e-9);
        assert_eq!(tracker.call_count("openai", "classify"), 2);
        assert_eq!(tracker.call_count("brave", "search"), 1);
        assert_eq!(tracker.service_call_count("openai"), 2);
        assert_eq!(tracker.calls().len(), 3);
    }

    #[test]
    fn can_afford_respects_ceiling() {
        let tracker = CostTracker::new(0.05);
        assert!(tracker.can_afford(0.05));
        tracker.record_api_call("openai", "classify", Some(0.04));
        assert!(tracker.can_afford(0.01));
        assert!(!tracker.can_afford(0.02));
    }

    #[test]
    fn check_refuses_over_budget() {
        let tracker = CostTracker::new(0.03);
        tracker.record_api_call("openai", "analyze", Some(0.02));
        let err = tracker.check("openai", 0.02).unwrap_err();
        assert!(matches!(err, CostRefusal::BudgetExhausted { .. }));
        assert_eq!(err.error_code(), ErrorCode::BudgetExceeded);
    }

    #[test]
    fn check_refuses_past_service_cap() {
        let tracker = CostTracker::new(100.0);
        for _ in 0..30 {
            tracker.record_api_call("brave", "search", None);
        }
        let err = tracker.check("brave", 0.003).unwrap_err();
        assert!(matches!(err, CostRefusal::CallCapReached { cap: 30, .. }));
        // Other services are unaffected.
        assert!(tracker.check("openai", 0.02).is_ok());
    }

    #[test]
    fn call_caps_are_configurable() {
        let tracker = CostTracker::new(100.0).with_call_cap("brave", 2);
        tracker.record_api_call("brave", "search", None);
        tracker.record_api_call("brave", "search", None);
        assert!(tracker.check("brave", 0.003).is_err());

        let raised = CostTracker::new(100.0).with_call_cap("openai", 200);
        assert_eq!(raised.call_cap("openai"), Some(200));
    }

    #[test]
    fn free_services_have_no_cap() {
        let tracker = CostTracker::default();
        for _ in 0..500 {
            tracker.record_api_call("gmail", "get", None);
        }
        assert!(tracker.check("gmail", 0.0).is_ok());
        assert!(tracker.total_cost().abs() < f64::EPSILON);
    }

    #[test]
    fn approaching_and_stop_thresholds() {
        let tracker = CostTracker::new(1.0);
        tracker.record_api_call("openai", "chat", Some(0.5));
        assert!(!tracker.is_approaching_limit());
        assert!(!tracker.should_stop());

        tracker.record_api_call("openai", "chat", Some(0.31));
        assert!(tracker.is_approaching_limit());
        assert!(!tracker.should_stop());

        tracker.record_api_call("openai", "chat", Some(0.19));
        assert!(tracker.should_stop());
    }

    #[test]
    fn reset_clears_everything() {
        let tracker = CostTracker::default();
        tracker.record_api_call("openai", "classify", None);
        tracker.reset();
        assert!(tracker.total_cost().abs() < f64::EPSILON);
        assert_eq!(tracker.call_count("openai", "classify"), 0);
        assert!(tracker.calls().is_empty());
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        use std::sync::Arc;
        let tracker = Arc::new(CostTracker::new(1_000.0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    tracker.record_api_call("gmail", "get", Some(0.001));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.service_call_count("gmail"), 800);
        assert!((tracker.total_cost() - 0.8).abs() < 1e-9);
    }
}
