use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Operation mode for a digest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Emails from the last 7 days.
    Weekly,
    /// All inbox-resident AI emails, capped.
    Cleanup,
    /// A bounded custom date range.
    Historical,
}

impl Mode {
    /// Return a string representation of the mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Cleanup => "cleanup",
            Self::Historical => "historical",
        }
    }

    /// Title-case form used in the digest subject line.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Weekly => "Weekly",
            Self::Cleanup => "Cleanup",
            Self::Historical => "Historical",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Self::Weekly),
            "cleanup" => Ok(Self::Cleanup),
            "historical" => Ok(Self::Historical),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Inclusive date bounds for a historical run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl RunWindow {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered by the window, inclusive of both ends.
    #[must_use]
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Display name and address of an email sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSender {
    /// Display name, when the `From` header carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Bare email address.
    pub address: String,
}

impl EmailSender {
    #[must_use]
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name,
            address: address.into(),
        }
    }

    /// Parse an RFC 5322-style `From` header value.
    ///
    /// Accepts `Display Name <user@host>` (with optional surrounding quotes
    /// on the name) as well as a bare `user@host`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let (Some(open), Some(close)) = (raw.rfind('<'), raw.rfind('>')) {
            if open < close {
                let address = raw[open + 1..close].trim().to_owned();
                let name = raw[..open].trim().trim_matches('"').trim();
                let name = if name.is_empty() {
                    None
                } else {
                    Some(name.to_owned())
                };
                return Self { name, address };
            }
        }
        Self {
            name: None,
            address: raw.to_owned(),
        }
    }

    /// Lowercased address, the canonical key for sender stores.
    #[must_use]
    pub fn canonical_address(&self) -> String {
        self.address.to_lowercase()
    }
}

impl std::fmt::Display for EmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// A single email as produced by the Fetch stage.
///
/// Created once and read-only thereafter; downstream stages reference
/// emails only by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailItem {
    /// Mailbox-unique message identifier.
    pub id: String,
    /// Conversation thread identifier.
    pub thread_id: String,
    pub sender: EmailSender,
    pub subject: String,
    /// RFC 3339 date of the message.
    pub date: String,
    pub snippet: String,
    /// Plain-text body, decoded from HTML when no text part exists.
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Result of a digest run, returned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub emails_found: u32,
    pub emails_processed: u32,
    pub batches: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Report for a run that found nothing to do.
    #[must_use]
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            emails_found: 0,
            emails_processed: 0,
            batches: 0,
            message: message.into(),
            error: None,
        }
    }

    /// Report for a run that failed before processing anything.
    #[must_use]
    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            emails_found: 0,
            emails_processed: 0,
            batches: 0,
            message: message.into(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_serde() {
        let json = serde_json::to_string(&Mode::Historical).unwrap();
        assert_eq!(json, "\"historical\"");
        let parsed: Mode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Mode::Historical);
    }

    #[test]
    fn mode_titles() {
        assert_eq!(Mode::Weekly.title(), "Weekly");
        assert_eq!(Mode::Cleanup.title(), "Cleanup");
        assert_eq!(Mode::Historical.title(), "Historical");
    }

    #[test]
    fn mode_from_str() {
        assert_eq!("weekly".parse::<Mode>().unwrap(), Mode::Weekly);
        assert_eq!("cleanup".parse::<Mode>().unwrap(), Mode::Cleanup);
        assert!("realtime".parse::<Mode>().is_err());
    }

    #[test]
    fn window_span_is_inclusive() {
        let w = RunWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert_eq!(w.span_days(), 1);

        let w = RunWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        );
        assert_eq!(w.span_days(), 91);
    }

    #[test]
    fn parse_sender_with_display_name() {
        let s = EmailSender::parse("AI Newsletter <news@example.com>");
        assert_eq!(s.name.as_deref(), Some("AI Newsletter"));
        assert_eq!(s.address, "news@example.com");
    }

    #[test]
    fn parse_sender_with_quoted_name() {
        let s = EmailSender::parse("\"Smith, Jane\" <jane@example.com>");
        assert_eq!(s.name.as_deref(), Some("Smith, Jane"));
        assert_eq!(s.address, "jane@example.com");
    }

    #[test]
    fn parse_bare_address() {
        let s = EmailSender::parse("bot@example.com");
        assert!(s.name.is_none());
        assert_eq!(s.address, "bot@example.com");
    }

    #[test]
    fn canonical_address_lowercases() {
        let s = EmailSender::parse("News <News@Example.COM>");
        assert_eq!(s.canonical_address(), "news@example.com");
    }

    #[test]
    fn sender_display() {
        let s = EmailSender::parse("AI Weekly <ai@example.com>");
        assert_eq!(s.to_string(), "AI Weekly <ai@example.com>");
        let s = EmailSender::parse("ai@example.com");
        assert_eq!(s.to_string(), "ai@example.com");
    }
}
