//! Language model client: chat completions for extraction, explanation and QA
//!
//! Defines the client trait and request type used by every pipeline stage.
//! Two implementations:
//! - `OpenAiChatClient`: calls an OpenAI-compatible `/chat/completions` endpoint
//! - `MockLanguageModel`: returns scripted responses and records requests (testing)
//!
//! Retry policy, if any, belongs to the client; pipeline stages issue each
//! request exactly once.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One completion request: a system instruction plus user content.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    /// Ask the endpoint to constrain output to a JSON object
    pub json_output: bool,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature,
            json_output: false,
        }
    }

    pub fn expecting_json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Errors from language model client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model not configured: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("response parse error: {0}")]
    ParseError(String),
}

/// Client trait for chat completions.
///
/// Abstracts over transport (HTTP, mock) so pipeline stages
/// don't depend on how the model is reached.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Issue one completion and return the raw content of the first choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

// ---------------------------------------------------------------------------
// OpenAiChatClient
// ---------------------------------------------------------------------------

/// Chat client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiChatClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("missing API key".into()));
        }
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let start = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            response_format: request.json_output.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "chat completion request failed");
                LlmError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "chat completion API error");
            return Err(LlmError::Api(format!("{}: {}", status, error_text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Api("no choices in completion response".into()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            "chat completion"
        );
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// MockLanguageModel
// ---------------------------------------------------------------------------

/// Mock client for testing. Replays scripted responses in order and
/// records every request it receives.
#[derive(Default)]
pub struct MockLanguageModel {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(content.into()));
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, error: LlmError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// All requests received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Api("no scripted response left".into())))
    }
}
