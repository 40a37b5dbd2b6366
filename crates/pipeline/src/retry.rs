use std::time::Duration;

use rand::Rng;

/// Strategy used to compute the delay before a retry.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Exponential backoff with multiplicative jitter and a cap.
    Exponential {
        base: Duration,
        factor: f64,
        /// Jitter fraction; the computed delay is scaled by a uniform
        /// sample from `[1 - jitter, 1 + jitter]`.
        jitter: f64,
        cap: Duration,
    },
    /// Fixed delay between attempts.
    Constant { delay: Duration },
    /// Retry immediately (tests).
    None,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.1,
            cap: Duration::from_secs(900),
        }
    }
}

impl RetryStrategy {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                base,
                factor,
                jitter,
                cap,
            } => {
                let exp = factor.powi(attempt.saturating_sub(1).min(32) as i32);
                let raw = base.as_secs_f64() * exp;
                let scale = if *jitter > 0.0 {
                    rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter)
                } else {
                    1.0
                };
                Duration::from_secs_f64((raw * scale).min(cap.as_secs_f64()))
            }
            Self::Constant { delay } => *delay,
            Self::None => Duration::ZERO,
        }
    }
}
