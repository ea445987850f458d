/// HTTP client for an OpenAI-compatible chat-completions API.
///
/// The client is transport-only: it sends one request and reports exactly how
/// it failed. Retry classification and backoff belong to the caller, which
/// knows which failures are worth repeating.
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::http::{envelope_message, read_limited_text};

#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    pub base_url: String,
    /// Bearer token sent as `Authorization` when present.
    pub api_key: Option<String>,
    pub default_timeout: Duration,
    pub max_error_body_bytes: usize,
}

impl ChatClientConfig {
    /// Load from environment variables, falling back to defaults:
    ///
    /// - `CHAT_BASE_URL` (default "https://api.openai.com/v1")
    /// - `CHAT_API_KEY` (optional)
    /// - `CHAT_TIMEOUT_SECS` (default 30)
    /// - `CHAT_MAX_ERROR_BODY_BYTES` (default 8192)
    pub fn from_env() -> Self {
        let base_url = std::env::var("CHAT_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let api_key = std::env::var("CHAT_API_KEY").ok();

        let default_timeout = std::env::var("CHAT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let max_error_body_bytes = std::env::var("CHAT_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_timeout,
            max_error_body_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("upstream returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

#[derive(Clone)]
pub struct ChatClient {
    config: ChatClientConfig,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, ChatClientError> {
        let http = reqwest::Client::builder()
            .user_agent("car-advisor/chat")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }

    /// Send a single chat-completion request.
    pub async fn chat_completions(
        &self,
        request: ChatCompletionRequest,
        timeout_override: Option<Duration>,
    ) -> Result<ChatCompletionResponse, ChatClientError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let timeout = timeout_override.unwrap_or(self.config.default_timeout);

        let mut req = self.http.post(&url).timeout(timeout).json(&request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(self.to_upstream_error(resp).await);
        }
        Ok(resp.json::<ChatCompletionResponse>().await?)
    }

    async fn to_upstream_error(&self, resp: reqwest::Response) -> ChatClientError {
        let status = resp.status();
        let body = read_limited_text(resp, self.config.max_error_body_bytes).await;
        match envelope_message(&body) {
            Some(message) => ChatClientError::Upstream { status, message },
            None => ChatClientError::UpstreamBody { status, body },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: Option<u32>,
    pub message: ChatCompletionMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}
