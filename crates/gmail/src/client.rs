use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use mailbrief_core::{EmailItem, now_ms};
use mailbrief_state::TokenStore;

use crate::error::MailboxError;
use crate::mailbox::Mailbox;
use crate::parse::email_from_message;
use crate::types::{Message, MessageList, TokenErrorResponse, TokenResponse};

/// Environment fallback for the refresh token when the token store is empty.
const REFRESH_TOKEN_ENV: &str = "GMAIL_REFRESH_TOKEN";

/// Seconds shaved off a token's lifetime so we refresh before expiry.
const TOKEN_EXPIRY_SLACK_SECS: u64 = 60;

/// Configuration for [`GmailClient`].
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Token-store user to read the refresh token for.
    pub user_id: String,
    /// REST base, e.g. `https://gmail.googleapis.com/gmail/v1`.
    pub api_base: String,
    /// OAuth token endpoint.
    pub token_endpoint: String,
    /// Delay between listing pages.
    pub page_delay: Duration,
    /// Messages fetched per batch group.
    pub batch_size: usize,
    /// Concurrent message gets within a batch group.
    pub fetch_concurrency: usize,
    pub timeout: Duration,
}

impl GmailConfig {
    /// Create a config with production endpoints and default batching.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_id: "default".to_owned(),
            api_base: "https://gmail.googleapis.com/gmail/v1".to_owned(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_owned(),
            page_delay: Duration::from_secs(1),
            batch_size: 100,
            fetch_concurrency: 10,
            timeout: Duration::from_secs(30),
        }
    }

    /// Point the client at a different API base (used by tests).
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Point the client at a different token endpoint (used by tests).
    #[must_use]
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at_ms: i64,
}

/// REST client for a Gmail-style mailbox.
///
/// The refresh token comes from the [`TokenStore`] (preferred) with an
/// environment fallback; access tokens are cached until shortly before
/// expiry. A successful fetch stamps the token's `last_used`.
pub struct GmailClient {
    config: GmailConfig,
    http: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for GmailClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailClient")
            .field("api_base", &self.config.api_base)
            .field("user_id", &self.config.user_id)
            .finish_non_exhaustive()
    }
}

impl GmailClient {
    pub fn new(config: GmailConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, MailboxError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MailboxError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http,
            tokens,
            cached: Mutex::new(None),
        })
    }

    /// Resolve the refresh token: token store first, environment second.
    async fn refresh_token(&self) -> Result<String, MailboxError> {
        match self.tokens.get(&self.config.user_id).await {
            Ok(Some(record)) => return Ok(record.refresh_token),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "token store read failed, trying environment"),
        }
        std::env::var(REFRESH_TOKEN_ENV).map_err(|_| {
            MailboxError::AuthInvalid(format!(
                "no refresh token in store for user '{}' and {REFRESH_TOKEN_ENV} is unset",
                self.config.user_id
            ))
        })
    }

    /// Get a valid access token, refreshing if the cached one is stale.
    async fn access_token(&self) -> Result<String, MailboxError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at_ms > now_ms() {
                return Ok(token.access_token.clone());
            }
        }

        let refresh_token = self.refresh_token().await?;
        debug!(endpoint = %self.config.token_endpoint, "refreshing mailbox access token");

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(&body) {
                if err.error == "invalid_grant" {
                    return Err(MailboxError::AuthInvalid(format!(
                        "refresh token rejected: {}",
                        err.error_description
                    )));
                }
            }
            return Err(MailboxError::from_status(status, body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailboxError::Decode(format!("bad token response: {e}")))?;

        let expires_at_ms =
            now_ms() + i64::try_from(token.expires_in.saturating_sub(TOKEN_EXPIRY_SLACK_SECS))
                .unwrap_or(0)
                * 1_000;
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at_ms,
        });
        Ok(token.access_token)
    }

    /// Stamp `last_used` on the stored token; failures are only logged.
    async fn touch_token(&self) {
        if let Err(e) = self
            .tokens
            .touch_last_used(&self.config.user_id, now_ms())
            .await
        {
            warn!(error = %e, "failed to stamp token last_used");
        }
    }

    async fn get_message(&self, token: &str, id: &str) -> Result<EmailItem, MailboxError> {
        let url = format!("{}/users/me/messages/{id}?format=full", self.config.api_base);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MailboxError::from_status(status, body));
        }

        let message: Message = response
            .json()
            .await
            .map_err(|e| MailboxError::Decode(format!("bad message response: {e}")))?;
        email_from_message(message)
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<String>, MailboxError> {
        let token = self.access_token().await?;
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = max_results.saturating_sub(ids.len() as u32);
            if remaining == 0 {
                break;
            }
            let mut request = self
                .http
                .get(format!("{}/users/me/messages", self.config.api_base))
                .bearer_auth(&token)
                .query(&[
                    ("q", query.to_owned()),
                    ("maxResults", remaining.min(500).to_string()),
                ]);
            if let Some(ref tok) = page_token {
                request = request.query(&[("pageToken", tok.as_str())]);
            }

            let response = request.send().await.map_err(map_transport_error)?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(MailboxError::from_status(status, body));
            }

            let page: MessageList = response
                .json()
                .await
                .map_err(|e| MailboxError::Decode(format!("bad listing response: {e}")))?;
            ids.extend(page.messages.into_iter().map(|m| m.id));

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
            tokio::time::sleep(self.config.page_delay).await;
        }

        info!(query, found = ids.len(), "mailbox search complete");
        self.touch_token().await;
        Ok(ids)
    }

    async fn fetch_messages(&self, ids: &[String]) -> Result<Vec<EmailItem>, MailboxError> {
        let token = self.access_token().await?;
        let mut emails = Vec::with_capacity(ids.len());

        for group in ids.chunks(self.config.batch_size) {
            let results: Vec<Result<EmailItem, MailboxError>> = stream::iter(group.to_vec())
                .map(|id| {
                    let token = token.clone();
                    async move { self.get_message(&token, &id).await }
                })
                .buffer_unordered(self.config.fetch_concurrency)
                .collect()
                .await;

            for result in results {
                match result {
                    Ok(email) => emails.push(email),
                    // Auth failures abort the fetch; anything else drops
                    // just the one message.
                    Err(e @ MailboxError::AuthInvalid(_)) => return Err(e),
                    Err(e) => warn!(error = %e, "skipping undecodable message"),
                }
            }
        }

        info!(requested = ids.len(), fetched = emails.len(), "mailbox fetch complete");
        self.touch_token().await;
        Ok(emails)
    }

    async fn archive(&self, ids: &[String]) -> Result<(), MailboxError> {
        if ids.is_empty() {
            return Ok(());
        }
        let token = self.access_token().await?;
        let url = format!("{}/users/me/messages/batchModify", self.config.api_base);

        // The batch-modify endpoint caps at 1000 ids per call.
        for group in ids.chunks(1000) {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .json(&json!({
                    "ids": group,
                    "removeLabelIds": ["INBOX"],
                }))
                .send()
                .await
                .map_err(map_transport_error)?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(MailboxError::from_status(status, body));
            }
        }

        info!(count = ids.len(), "archived messages");
        Ok(())
    }
}

fn map_transport_error(err: reqwest::Error) -> MailboxError {
    if err.is_timeout() {
        MailboxError::Network(format!("mailbox request timed out: {err}"))
    } else {
        MailboxError::Network(err.to_string())
    }
}
