use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use mailbrief_core::{ErrorCode, ServiceError, now_ms};

/// Services fronted by a circuit breaker.
pub const SERVICES: [&str; 5] = ["openai", "firecrawl", "brave", "gmail", "resend"];

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; calls flow through.
    Closed,
    /// The dependency is failing; calls are refused immediately.
    Open,
    /// Recovery probing; a bounded number of calls are admitted.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for a per-service circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Time spent open before probing resumes.
    pub reset_timeout: Duration,
    /// Probes admitted in half-open; the same count of consecutive
    /// successes closes the circuit.
    pub half_open_max_attempts: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_attempts: 3,
        }
    }
}

/// Error returned when a call is refused by an open circuit.
#[derive(Debug, Error)]
#[error("circuit open for {service}")]
pub struct CircuitOpenError {
    pub service: String,
}

impl ServiceError for CircuitOpenError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::CircuitOpen
    }
}

#[derive(Debug, Clone)]
struct CircuitData {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure_ms: Option<i64>,
    /// Probes admitted since entering half-open.
    half_open_probes: u32,
}

impl Default for CircuitData {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            last_failure_ms: None,
            half_open_probes: 0,
        }
    }
}

/// Observable view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub last_failure_ms: Option<i64>,
}

/// Circuit breaker for a single service.
///
/// Transitions:
/// - `Closed` -> `Open` when consecutive failures reach the threshold
/// - `Open` -> `HalfOpen` once the reset timeout elapses
/// - `HalfOpen` -> `Closed` after enough consecutive probe successes
/// - `HalfOpen` -> `Open` on any probe failure
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    config: BreakerConfig,
    data: Mutex<CircuitData>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(service: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            service: service.into(),
            config,
            data: Mutex::new(CircuitData::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitData> {
        self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Acquire permission to call the wrapped service.
    ///
    /// Callers must follow up with [`record_success`](Self::record_success)
    /// or [`record_failure`](Self::record_failure).
    pub fn try_acquire(&self) -> Result<(), CircuitOpenError> {
        let mut data = self.lock();
        match data.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = data
                    .last_failure_ms
                    .map_or(i64::MAX, |t| (now_ms() - t).max(0));
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.config.reset_timeout.as_millis() as i64;
                if elapsed > timeout_ms {
                    debug!(service = %self.service, "circuit transitioning open -> half-open");
                    data.state = CircuitState::HalfOpen;
                    data.successes = 0;
                    data.half_open_probes = 1;
                    Ok(())
                } else {
                    Err(CircuitOpenError {
                        service: self.service.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if data.half_open_probes < self.config.half_open_max_attempts {
                    data.half_open_probes += 1;
                    Ok(())
                } else {
                    Err(CircuitOpenError {
                        service: self.service.clone(),
                    })
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut data = self.lock();
        match data.state {
            CircuitState::Closed => {
                data.failures = 0;
            }
            CircuitState::HalfOpen => {
                data.successes += 1;
                if data.successes >= self.config.half_open_max_attempts {
                    info!(service = %self.service, "circuit closing after successful probes");
                    *data = CircuitData::default();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut data = self.lock();
        let now = now_ms();
        match data.state {
            CircuitState::Closed => {
                data.failures += 1;
                data.last_failure_ms = Some(now);
                if data.failures >= self.config.failure_threshold {
                    info!(
                        service = %self.service,
                        failures = data.failures,
                        "circuit opening"
                    );
                    data.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                info!(service = %self.service, "circuit re-opening after probe failure");
                data.state = CircuitState::Open;
                data.last_failure_ms = Some(now);
                data.successes = 0;
                data.half_open_probes = 0;
            }
            CircuitState::Open => {
                data.last_failure_ms = Some(now);
            }
        }
    }

    /// Current state, without triggering transitions.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let data = self.lock();
        BreakerSnapshot {
            state: data.state,
            failures: data.failures,
            successes: data.successes,
            last_failure_ms: data.last_failure_ms,
        }
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        *self.lock() = CircuitData::default();
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }
}

/// Process-wide registry of breakers keyed by service name.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        let registry = Self {
            config,
            breakers: DashMap::new(),
        };
        for service in SERVICES {
            registry.get(service);
        }
        registry
    }

    /// Breaker for a service, created on first use.
    #[must_use]
    pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_owned())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(service, self.config.clone()))
            })
            .clone()
    }

    /// Snapshots of every registered breaker, sorted by service name.
    #[must_use]
    pub fn snapshots(&self) -> Vec<(String, BreakerSnapshot)> {
        let mut all: Vec<(String, BreakerSnapshot)> = self
            .breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            half_open_max_attempts: 2,
        }
    }

    fn create(config: BreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new("test", config)
    }

    /// Let a zero reset-timeout elapse (the transition requires
    /// `elapsed > reset_timeout`, strictly).
    fn wait_reset() {
        std::thread::sleep(Duration::from_millis(5));
    }

    #[test]
    fn state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }

    #[test]
    fn default_config_values() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.half_open_max_attempts, 3);
    }

    #[test]
    fn starts_closed() {
        let cb = create(test_config());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = create(test_config());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = create(test_config());
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn open_refuses_before_timeout() {
        let cb = create(test_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(cb.try_acquire().is_err());
        assert!(cb.try_acquire().is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn open_transitions_to_half_open_after_timeout() {
        let cb = create(BreakerConfig {
            reset_timeout: Duration::ZERO,
            ..test_config()
        });
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        // Zero timeout: once any time has passed the next acquire flips to
        // half-open and admits a probe.
        wait_reset();
        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_admits_bounded_probes() {
        let cb = create(BreakerConfig {
            reset_timeout: Duration::ZERO,
            half_open_max_attempts: 2,
            ..test_config()
        });
        for _ in 0..3 {
            cb.record_failure();
        }
        wait_reset();
        assert!(cb.try_acquire().is_ok()); // probe 1 (transition)
        assert!(cb.try_acquire().is_ok()); // probe 2
        assert!(cb.try_acquire().is_err()); // over the probe budget
    }

    #[test]
    fn half_open_closes_after_consecutive_successes() {
        let cb = create(BreakerConfig {
            reset_timeout: Duration::ZERO,
            half_open_max_attempts: 2,
            ..test_config()
        });
        for _ in 0..3 {
            cb.record_failure();
        }
        wait_reset();
        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        // Counters are zeroed on close.
        let snap = cb.snapshot();
        assert_eq!(snap.failures, 0);
        assert_eq!(snap.successes, 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = create(BreakerConfig {
            reset_timeout: Duration::ZERO,
            ..test_config()
        });
        for _ in 0..3 {
            cb.record_failure();
        }
        wait_reset();
        assert!(cb.try_acquire().is_ok());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_failure_resets_success_progress() {
        let cb = create(BreakerConfig {
            reset_timeout: Duration::ZERO,
            half_open_max_attempts: 2,
            ..test_config()
        });
        for _ in 0..3 {
            cb.record_failure();
        }
        wait_reset();
        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Recover again: the earlier success does not carry over.
        wait_reset();
        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn success_in_open_state_does_nothing() {
        let cb = create(test_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn reset_returns_to_closed() {
        let cb = create(test_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn snapshot_exposes_counters() {
        let cb = create(test_config());
        cb.record_failure();
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failures, 1);
        assert!(snap.last_failure_ms.is_some());
    }

    #[test]
    fn open_error_is_retryable_circuit_open() {
        let err = CircuitOpenError {
            service: "openai".into(),
        };
        assert_eq!(err.error_code(), ErrorCode::CircuitOpen);
        assert!(err.error_code().is_retryable());
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn registry_preregisters_services() {
        let registry = BreakerRegistry::default();
        let snapshots = registry.snapshots();
        let names: Vec<&str> = snapshots.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["brave", "firecrawl", "gmail", "openai", "resend"]);
    }

    #[test]
    fn registry_breakers_are_independent() {
        let registry = BreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        });
        registry.get("openai").record_failure();
        assert_eq!(registry.get("openai").state(), CircuitState::Open);
        assert_eq!(registry.get("brave").state(), CircuitState::Closed);
    }

    #[test]
    fn registry_returns_same_instance() {
        let registry = BreakerRegistry::default();
        let a = registry.get("openai");
        a.record_failure();
        assert_eq!(registry.get("openai").snapshot().failures, 1);
    }

    #[test]
    fn concurrent_operations_keep_state_valid() {
        let cb = Arc::new(create(BreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::ZERO,
            half_open_max_attempts: 2,
        }));
        let mut handles = Vec::new();
        for i in 0..16 {
            let cb = Arc::clone(&cb);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    match i % 3 {
                        0 => cb.record_failure(),
                        1 => cb.record_success(),
                        _ => {
                            let _ = cb.try_acquire();
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // No panics, and the state is one of the three valid values.
        let state = cb.state();
        assert!(matches!(
            state,
            CircuitState::Closed | CircuitState::Open | CircuitState::HalfOpen
        ));
    }

    #[test]
    fn full_lifecycle_multiple_cycles() {
        let cb = create(BreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::ZERO,
            half_open_max_attempts: 1,
        });

        // Cycle 1: Closed -> Open -> HalfOpen -> Closed
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        wait_reset();
        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);

        // Cycle 2: fail the probe, then recover
        cb.record_failure();
        cb.record_failure();
        wait_reset();
        assert!(cb.try_acquire().is_ok());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        wait_reset();
        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
