use serde::{Deserialize, Serialize};

/// Effective confidence at or above this value makes a sender "known".
pub const KNOWN_CONFIDENCE_FLOOR: f64 = 50.0;

/// Confidence points lost per day since the last classification.
///
/// Decay is applied at read time only; stored confidence is never mutated
/// by a read.
pub const DECAY_RATE_PER_DAY: f64 = 1.0;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Which population a sender belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderClass {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "NON_AI")]
    NonAi,
}

impl SenderClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "AI",
            Self::NonAi => "NON_AI",
        }
    }
}

impl std::fmt::Display for SenderClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified sender.
///
/// A given `sender_email` lives in at most one population at a time;
/// writers must remove it from the other population before reinserting
/// under a different class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderRecord {
    /// Lowercased email address, the store key.
    pub sender_email: String,
    /// Domain part of the address.
    pub domain: String,
    #[serde(rename = "classification")]
    pub class: SenderClass,
    /// Stored confidence in `[0, 100]`.
    pub confidence: f64,
    /// Unix milliseconds of the most recent classification.
    pub last_classified_at: i64,
    #[serde(default)]
    pub classification_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newsletter_name: Option<String>,
}

impl SenderRecord {
    /// Create a record for a freshly classified sender.
    #[must_use]
    pub fn new(email: &str, class: SenderClass, confidence: f64, now_ms: i64) -> Self {
        let sender_email = email.to_lowercase();
        let domain = domain_of(&sender_email);
        Self {
            sender_email,
            domain,
            class,
            confidence: confidence.clamp(0.0, 100.0),
            last_classified_at: now_ms,
            classification_count: 1,
            display_name: None,
            newsletter_name: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Confidence after read-time decay, clamped at zero.
    ///
    /// Side-effect free: the stored record is untouched, which keeps
    /// writes cheap and avoids per-read TTL bookkeeping.
    #[must_use]
    pub fn effective_confidence(&self, now_ms: i64) -> f64 {
        let elapsed_ms = (now_ms - self.last_classified_at).max(0);
        #[allow(clippy::cast_precision_loss)]
        let days = elapsed_ms as f64 / MS_PER_DAY;
        (self.confidence - DECAY_RATE_PER_DAY * days).max(0.0)
    }

    /// Whether the sender still counts as known at `now_ms`.
    #[must_use]
    pub fn is_known(&self, now_ms: i64) -> bool {
        self.effective_confidence(now_ms) >= KNOWN_CONFIDENCE_FLOOR
    }
}

/// Extract the domain part of an email address (empty when there is none).
#[must_use]
pub fn domain_of(email: &str) -> String {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_lowercase())
        .unwrap_or_default()
}
