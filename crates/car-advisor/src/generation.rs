/// Generation capability and its production adapter.
///
/// `ChatGenerator` bridges the pipeline to an OpenAI-compatible chat API and
/// classifies transport failures into the pipeline's retryable/terminal
/// taxonomy. The client itself never retries; that policy lives in the
/// pipeline.
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;

use advisor_common::chat::{ChatClient, ChatClientError, ChatCompletionRequest, Message};

use crate::error::GenerationError;
use crate::model::{ComposedPrompt, RawGeneration};

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &ComposedPrompt) -> Result<RawGeneration, GenerationError>;
}

pub struct ChatGenerator {
    client: ChatClient,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ChatGenerator {
    pub fn new(
        client: ChatClient,
        model: impl Into<String>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl Generator for ChatGenerator {
    async fn generate(&self, prompt: &ComposedPrompt) -> Result<RawGeneration, GenerationError> {
        let messages = prompt
            .turns()
            .iter()
            .map(|turn| Message {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect();

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .chat_completions(request, None)
            .await
            .map_err(classify)?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| {
                GenerationError::InvalidResponse(
                    "missing choices[0].message.content".to_string(),
                )
            })?;

        Ok(RawGeneration {
            text,
            prompt: prompt.clone(),
            at: Utc::now(),
        })
    }
}

/// Map transport failures onto the pipeline taxonomy. HTTP 429 is a rate
/// limit, request timeouts are timeouts, refusals and server errors are
/// unavailability, and an undecodable payload is an invalid response.
fn classify(error: ChatClientError) -> GenerationError {
    match error {
        ChatClientError::Request(e) => {
            if e.is_timeout() {
                GenerationError::Timeout
            } else if e.is_decode() {
                GenerationError::InvalidResponse(e.to_string())
            } else {
                GenerationError::Unavailable(e.to_string())
            }
        }
        ChatClientError::Upstream { status, message } => classify_status(status, message),
        ChatClientError::UpstreamBody { status, body } => classify_status(status, body),
    }
}

fn classify_status(status: StatusCode, detail: String) -> GenerationError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        GenerationError::Timeout
    } else {
        GenerationError::Unavailable(format!("status={status} {detail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_covers_the_taxonomy() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            GenerationError::RateLimited
        ));
        assert!(matches!(
            classify_status(StatusCode::GATEWAY_TIMEOUT, String::new()),
            GenerationError::Timeout
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            GenerationError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, String::new()),
            GenerationError::Unavailable(_)
        ));
    }
}
