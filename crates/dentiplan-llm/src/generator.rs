//! Text generator contract, model parameters and a scripted generator for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model name prefixes that reject `temperature` and take `max_completion_tokens`.
pub const REASONING_MODEL_PREFIXES: [&str; 4] = ["o1", "o3", "o4", "gpt-5"];

/// Generation errors.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generator returned an empty response")]
    EmptyResponse,

    #[error("Invalid generator response: {0}")]
    InvalidResponse(String),

    #[error("Generation cancelled")]
    Cancelled,
}

pub type GenerationResult<T> = Result<T, GenerationError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters as sent to the generator.
///
/// Built with [`ModelParams::for_model`], which knows which models accept
/// which controls. Absent fields are not serialized.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelParams {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

impl ModelParams {
    pub fn for_model(model: impl Into<String>, temperature: f64, max_tokens: u32) -> Self {
        let model = model.into();
        if is_reasoning_model(&model) {
            Self {
                model,
                temperature: None,
                max_tokens: None,
                max_completion_tokens: Some(max_tokens),
            }
        } else {
            Self {
                model,
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                max_completion_tokens: None,
            }
        }
    }
}

/// Whether `model` belongs to a family that only takes completion-token limits.
pub fn is_reasoning_model(model: &str) -> bool {
    let model = model.trim().to_lowercase();
    REASONING_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// Generator endpoint and sampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-4o".into(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_ms: 60_000,
        }
    }
}

impl GeneratorConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }

    pub fn params(&self) -> ModelParams {
        ModelParams::for_model(&self.model, self.temperature, self.max_tokens)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Anything that turns chat messages into generated text.
pub trait TextGenerator: Send + Sync {
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &ModelParams,
        timeout: Duration,
    ) -> GenerationResult<String>;
}

/// Generator replaying queued replies in order (for testing).
///
/// Records every request it receives. Once the queue is drained it
/// answers with [`GenerationError::EmptyResponse`].
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<GenerationResult<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.lock_replies().push_back(Ok(reply.into()));
    }

    pub fn push_failure(&self, error: GenerationError) {
        self.lock_replies().push_back(Err(error));
    }

    /// Messages of each request received so far.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<GenerationResult<String>>> {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TextGenerator for ScriptedGenerator {
    fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &ModelParams,
        _timeout: Duration,
    ) -> GenerationResult<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        self.lock_replies()
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }
}
