use serde::{Deserialize, Serialize};

/// Model quality tier used by the pipeline stages.
///
/// Classify and Analyze use the quality tier; Critique runs on the mini
/// tier. Tiers map to concrete model names; cost accounting is keyed by
/// operation at the call site, not by tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Full-size model for analysis quality.
    Quality,
    /// Small, cheap model for short auxiliary calls.
    Mini,
}

impl ModelTier {
    /// Default model name for the tier.
    #[must_use]
    pub fn model(self) -> &'static str {
        match self {
            Self::Quality => "gpt-4o",
            Self::Mini => "gpt-4o-mini",
        }
    }
}
