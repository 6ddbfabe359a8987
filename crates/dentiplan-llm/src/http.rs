//! OpenAI-compatible chat completion client.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::generator::{
    ChatMessage, GenerationError, GenerationResult, GeneratorConfig, ModelParams, TextGenerator,
};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(flatten)]
    params: &'a ModelParams,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking generator for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiChatGenerator {
    config: GeneratorConfig,
    client: Client,
}

impl OpenAiChatGenerator {
    pub fn new(config: GeneratorConfig) -> GenerationResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GenerationError::Http(e.to_string()))?;
        Ok(Self::with_client(config, client))
    }

    /// Use a preconfigured client (proxies, TLS roots).
    pub fn with_client(config: GeneratorConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl TextGenerator for OpenAiChatGenerator {
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &ModelParams,
        timeout: Duration,
    ) -> GenerationResult<String> {
        let request = ChatRequest { params, messages };
        tracing::debug!(
            model = %params.model,
            messages = messages.len(),
            "Sending chat completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| transport_error(e, timeout))?;

        let body: ChatResponse = response.json().map_err(|e| body_error(e, timeout))?;
        first_content(body)
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> GenerationError {
    if error.is_timeout() {
        GenerationError::Timeout(timeout)
    } else {
        GenerationError::Http(error.to_string())
    }
}

/// Errors while reading the body: a stalled body is a timeout, anything else is malformed.
fn body_error(error: reqwest::Error, timeout: Duration) -> GenerationError {
    if error.is_timeout() {
        GenerationError::Timeout(timeout)
    } else {
        GenerationError::InvalidResponse(error.to_string())
    }
}

fn first_content(body: ChatResponse) -> GenerationResult<String> {
    let content = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("no choices".into()))?
        .message
        .content
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(content)
}
