//! Wire types for the Gmail-style REST API.

use serde::Deserialize;

/// One page of a message listing.
#[derive(Debug, Deserialize)]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// A message id/thread pair from a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
}

/// A full message as returned by `format=full`.
#[derive(Debug, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,
    /// Epoch milliseconds as a decimal string.
    #[serde(rename = "internalDate")]
    pub internal_date: Option<String>,
    pub payload: Option<MessagePart>,
}

/// A MIME part of a message; multipart messages nest recursively.
#[derive(Debug, Default, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Body bytes of a part, base64url-encoded.
#[derive(Debug, Default, Deserialize)]
pub struct PartBody {
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// OAuth token-endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

/// OAuth token-endpoint error body.
#[derive(Debug, Deserialize)]
pub struct TokenErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}
