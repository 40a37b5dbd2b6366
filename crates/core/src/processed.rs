use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Days a processed-email record is retained before TTL expiry.
pub const PROCESSED_TTL_DAYS: i64 = 90;

/// Durable record that an email made it into a delivered digest.
///
/// Written by the Send stage only after a successful delivery; an email
/// never appears processed unless its contents reached the recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// Mailbox-unique email id, the store key.
    pub email_id: String,
    pub subject: String,
    /// RFC 3339 timestamp of processing.
    pub processed_at: String,
    /// Unix milliseconds of processing.
    pub timestamp_ms: i64,
    /// Unix milliseconds after which the record may be reaped.
    pub expires_at_ms: i64,
}

impl ProcessedRecord {
    #[must_use]
    pub fn new(email_id: impl Into<String>, subject: impl Into<String>, now: DateTime<Utc>) -> Self {
        let timestamp_ms = now.timestamp_millis();
        Self {
            email_id: email_id.into(),
            subject: subject.into(),
            processed_at: now.to_rfc3339(),
            timestamp_ms,
            expires_at_ms: timestamp_ms + PROCESSED_TTL_DAYS * 86_400_000,
        }
    }

    /// Whether the record has outlived its retention window.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// OAuth refresh-token record for a mailbox user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Owning user; a single-user deployment uses `"default"`.
    pub user_id: String,
    pub refresh_token: String,
    /// Unix milliseconds of the last token update.
    pub updated_at_ms: i64,
    /// Unix milliseconds of the last successful mailbox fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_ms: Option<i64>,
}

impl TokenRecord {
    #[must_use]
    pub fn new(user_id: impl Into<String>, refresh_token: impl Into<String>, now_ms: i64) -> Self {
        Self {
            user_id: user_id.into(),
            refresh_token: refresh_token.into(),
            updated_at_ms: now_ms,
            last_used_ms: None,
        }
    }
}
