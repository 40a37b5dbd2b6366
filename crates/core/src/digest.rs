use serde::{Deserialize, Serialize};

use crate::types::Mode;

/// Per-email analysis produced by the Analyze stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub title: String,
    /// Analyst commentary on the item.
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_it_matters: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Display form of the originating sender.
    pub sender: String,
    /// RFC 3339 date of the originating email.
    pub date: String,
    /// Contrarian take, written only by the Critique stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<String>,
}

/// Aggregate counters rendered at the bottom of a digest.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DigestStats {
    pub total_emails: u32,
    pub ai_emails: u32,
    pub processed_emails: u32,
    pub total_cost: f64,
}

/// Input to the Send stage: everything needed to render one digest email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestOutput {
    pub summaries: Vec<Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what_happened: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_themes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub takeaways: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub product_plays: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_plays: Vec<String>,
    pub stats: DigestStats,
    pub mode: Mode,
    /// RFC 3339 timestamp of digest assembly.
    pub timestamp: String,
}

impl DigestOutput {
    /// Assemble a digest from completed summaries.
    #[must_use]
    pub fn new(summaries: Vec<Summary>, stats: DigestStats, mode: Mode, timestamp: String) -> Self {
        Self {
            summaries,
            headline: None,
            short_message: None,
            what_happened: None,
            key_themes: Vec::new(),
            takeaways: Vec::new(),
            product_plays: Vec::new(),
            tools: Vec::new(),
            role_plays: Vec::new(),
            stats,
            mode,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary() -> Summary {
        Summary {
            title: "New model released".to_owned(),
            summary: "A short take.".to_owned(),
            key_insights: vec!["insight".to_owned()],
            why_it_matters: Some("it matters".to_owned()),
            action_items: vec![],
            category: None,
            sender: "AI Weekly <ai@example.com>".to_owned(),
            date: "2024-06-01T08:00:00Z".to_owned(),
            critique: None,
        }
    }

    #[test]
    fn summary_omits_empty_optionals() {
        let json = serde_json::to_string(&sample_summary()).unwrap();
        assert!(!json.contains("action_items"));
        assert!(!json.contains("critique"));
        assert!(!json.contains("category"));
        assert!(json.contains("why_it_matters"));
    }

    #[test]
    fn digest_round_trip() {
        let digest = DigestOutput::new(
            vec![sample_summary()],
            DigestStats {
                total_emails: 10,
                ai_emails: 3,
                processed_emails: 3,
                total_cost: 0.12,
            },
            Mode::Weekly,
            "2024-06-02T09:00:00Z".to_owned(),
        );
        let json = serde_json::to_string(&digest).unwrap();
        let parsed: DigestOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.summaries.len(), 1);
        assert_eq!(parsed.stats.ai_emails, 3);
        assert_eq!(parsed.mode, Mode::Weekly);
    }
}
