use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::client::{ChatClient, ChatRequest};
use crate::error::LlmError;

/// Scripted chat client for tests.
///
/// Returns queued responses in order; once the queue is empty, falls back
/// to a default response. Records every request for assertions.
#[derive(Debug, Default)]
pub struct MockChatClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    default_response: Mutex<Option<String>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicU32,
}

impl MockChatClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that answers every call with the same content.
    #[must_use]
    pub fn always(response: impl Into<String>) -> Self {
        let mock = Self::new();
        *mock.default_response.lock().unwrap() = Some(response.into());
        mock
    }

    /// Queue one successful response.
    pub fn push_response(&self, content: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(content.into()));
    }

    /// Queue one failing response (surfaced as a parse error).
    pub fn push_invalid(&self, message: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Err(message.into()));
    }

    /// Set the fallback used when the queue runs dry.
    pub fn set_default(&self, content: impl Into<String>) {
        *self.default_response.lock().unwrap() = Some(content.into());
    }

    /// Number of completions served.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// All requests observed so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(scripted) = self.responses.lock().unwrap().pop_front() {
            return scripted.map_err(LlmError::Parse);
        }
        self.default_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LlmError::Api {
                status: 500,
                message: "mock: no scripted response".into(),
            })
    }
}

/// A chat client that always fails with the given error message.
#[derive(Debug)]
pub struct FailingChatClient {
    message: String,
}

impl FailingChatClient {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ChatClient for FailingChatClient {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
        Err(LlmError::Api {
            status: 503,
            message: self.message.clone(),
        })
    }
}
