pub mod groq;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::sync::Arc;

use super::{ GenerationParams, LlmConfig };
use self::groq::GroqChatClient;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("completion endpoint returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed completion response: {0}")]
    Decode(String),
    #[error("completion response contained no text")]
    EmptyResponse,
    #[error("client configuration error: {0}")]
    Config(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ChatError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else if err.is_decode() {
            ChatError::Decode(err.to_string())
        } else if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            ChatError::Network(err.to_string())
        } else {
            ChatError::Unexpected(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub prompt: String,
    pub params: GenerationParams,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest
    ) -> Result<CompletionResponse, ChatError>;

    fn get_base_url(&self) -> String;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, ChatError> {
    let client = GroqChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
