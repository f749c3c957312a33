use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use parley_core::config::{LlmConfig, LlmProvider};
use parley_core::domain::conversation::{ChatMessage, MessageRole};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_CAP: usize = 500;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode provider response: {0}")]
    Decode(String),
    #[error("provider returned an empty completion")]
    EmptyCompletion,
    #[error("llm configuration invalid: {0}")]
    Configuration(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::EmptyCompletion | Self::Configuration(_) => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Chat completions over HTTP: OpenAI-compatible for `openai` and `ollama`, messages API for
/// `anthropic`.
pub struct HttpLlmClient {
    http: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            http: build_http_client(config.timeout_secs)?,
            provider: config.provider,
            base_url: base_url(config),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    fn request(&self, messages: &[ChatMessage]) -> RequestBuilder {
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                let body = OpenAiChatRequest {
                    model: &self.model,
                    messages: messages.iter().map(OpenAiMessage::from).collect(),
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                };
                let request =
                    self.http.post(format!("{}/v1/chat/completions", self.base_url)).json(&body);
                match &self.api_key {
                    Some(key) => request.bearer_auth(key.expose_secret()),
                    None => request,
                }
            }
            LlmProvider::Anthropic => {
                let system = messages
                    .iter()
                    .filter(|message| message.role == MessageRole::System)
                    .map(|message| message.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let body = AnthropicRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    temperature: self.temperature,
                    system: (!system.is_empty()).then_some(system),
                    messages: messages
                        .iter()
                        .filter(|message| message.role != MessageRole::System)
                        .map(OpenAiMessage::from)
                        .collect(),
                };
                let request = self
                    .http
                    .post(format!("{}/v1/messages", self.base_url))
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body);
                match &self.api_key {
                    Some(key) => request.header("x-api-key", key.expose_secret()),
                    None => request,
                }
            }
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let payload = send_with_retries(|| self.request(messages), self.max_retries).await?;
        let text = match self.provider {
            LlmProvider::OpenAi | LlmProvider::Ollama => openai_completion_text(&payload)?,
            LlmProvider::Anthropic => anthropic_completion_text(&payload)?,
        };
        if text.trim().is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for OpenAiMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::Human => "user",
            MessageRole::Assistant => "assistant",
        };
        Self { role, content: &message.content }
    }
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|error| LlmError::Configuration(format!("http client: {error}")))
}

pub(crate) fn base_url(config: &LlmConfig) -> String {
    config
        .base_url
        .as_deref()
        .unwrap_or(config.provider.default_base_url())
        .trim_end_matches('/')
        .to_string()
}

/// Sends a JSON request, retrying transport failures, 429 and 5xx up to `max_retries` times.
pub(crate) async fn send_with_retries<F>(build: F, max_retries: u32) -> Result<Value, LlmError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match send_once(build()).await {
            Ok(payload) => return Ok(payload),
            Err(error) if error.is_retryable() && attempt < max_retries => {
                attempt += 1;
                warn!(
                    event_name = "agent.llm.retry",
                    attempt,
                    max_retries,
                    error = %error,
                    "retrying model provider request"
                );
                tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
            }
            Err(error) => return Err(error),
        }
    }
}

async fn send_once(request: RequestBuilder) -> Result<Value, LlmError> {
    let response = request.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_CAP).collect(),
        });
    }
    response.json::<Value>().await.map_err(|error| LlmError::Decode(error.to_string()))
}

fn openai_completion_text(payload: &Value) -> Result<String, LlmError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::Decode("missing choices[0].message.content".to_string()))
}

fn anthropic_completion_text(payload: &Value) -> Result<String, LlmError> {
    let blocks = payload
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::Decode("missing content blocks".to_string()))?;
    Ok(blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(""))
}
