pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub mod parse;
pub mod tier;

pub use client::{ChatClient, ChatRequest};
pub use config::LlmConfig;
pub use error::LlmError;
pub use http::OpenAiClient;
pub use mock::{FailingChatClient, MockChatClient};
pub use parse::parse_json_response;
pub use tier::ModelTier;
