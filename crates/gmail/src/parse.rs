//! Conversion of raw API messages into [`EmailItem`]s.

use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::DateTime;
use regex::Regex;

use mailbrief_core::{EmailItem, EmailSender};

use crate::error::MailboxError;
use crate::types::{Message, MessagePart};

/// Length of a computed snippet when the API supplies none.
const SNIPPET_LEN: usize = 200;

/// Convert a full API message into an [`EmailItem`].
///
/// The body prefers a decoded `text/plain` part; an HTML part is stripped
/// to text as the fallback. A message with neither yields an empty body.
pub fn email_from_message(msg: Message) -> Result<EmailItem, MailboxError> {
    let payload = msg.payload.unwrap_or_default();

    let subject = header(&payload, "Subject").unwrap_or_default();
    let sender = EmailSender::parse(&header(&payload, "From").unwrap_or_default());
    let date = message_date(&payload, msg.internal_date.as_deref());

    let body = match find_part(&payload, "text/plain") {
        Some(data) => decode_base64url(data)?,
        None => match find_part(&payload, "text/html") {
            Some(data) => html_to_text(&decode_base64url(data)?),
            None => String::new(),
        },
    };

    let snippet = if msg.snippet.is_empty() {
        truncate_chars(body.trim(), SNIPPET_LEN)
    } else {
        msg.snippet
    };

    Ok(EmailItem {
        id: msg.id,
        thread_id: msg.thread_id,
        sender,
        subject,
        date,
        snippet,
        body,
        labels: msg.label_ids,
    })
}

/// Case-insensitive header lookup on the top-level part.
fn header(payload: &MessagePart, name: &str) -> Option<String> {
    payload
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// RFC 3339 date for the message: the `Date` header when parseable,
/// otherwise the provider's internal epoch-millisecond timestamp.
fn message_date(payload: &MessagePart, internal_date: Option<&str>) -> String {
    if let Some(raw) = header(payload, "Date") {
        if let Ok(parsed) = DateTime::parse_from_rfc2822(raw.trim()) {
            return parsed.to_rfc3339();
        }
    }
    if let Some(ms) = internal_date.and_then(|s| s.parse::<i64>().ok()) {
        if let Some(dt) = DateTime::from_timestamp_millis(ms) {
            return dt.to_rfc3339();
        }
    }
    String::new()
}

/// Depth-first search for the first part of the given MIME type that
/// carries body data.
fn find_part<'a>(part: &'a MessagePart, mime_type: &str) -> Option<&'a str> {
    if part.mime_type == mime_type {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            if !data.is_empty() {
                return Some(data);
            }
        }
    }
    part.parts.iter().find_map(|p| find_part(p, mime_type))
}

/// Decode a base64url body (padding optional, as the provider emits it).
pub fn decode_base64url(data: &str) -> Result<String, MailboxError> {
    let trimmed = data.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| MailboxError::Decode(format!("invalid base64url body: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn tag_regexes() -> &'static (Regex, Regex, Regex) {
    static RE: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?is)<(style|script)\b.*?</(style|script)>").expect("static regex"),
            Regex::new(r"(?i)<(br|/p|/div|/tr|/li|/h[1-6])\s*/?>").expect("static regex"),
            Regex::new(r"(?s)<[^>]*>").expect("static regex"),
        )
    })
}

/// Strip an HTML document down to readable text.
pub fn html_to_text(html: &str) -> String {
    let (strip_blocks, breaks, tags) = tag_regexes();
    let text = strip_blocks.replace_all(html, "");
    let text = breaks.replace_all(&text, "\n");
    let text = tags.replace_all(&text, "");
    let text = decode_entities(&text);

    // Collapse runs of blank lines and trailing space.
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_owned()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

/// Truncate to at most `limit` characters on a char boundary.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
