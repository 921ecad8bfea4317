//! Language-model client
//!
//! The remote extraction capability: a system prompt plus document text in,
//! the model's raw reply out. The reply is untrusted; parsing it is the
//! gateway's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use covenant_utils::{CovenantError, CovenantResult, ExtractionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTask {
    Classify,
    ExtractContract,
    ExtractInvoice,
}

impl std::fmt::Display for ExtractionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classify => write!(f, "classify"),
            Self::ExtractContract => write!(f, "extract_contract"),
            Self::ExtractInvoice => write!(f, "extract_invoice"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub task: ExtractionTask,
    pub system_prompt: &'static str,
    pub document_text: String,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier recorded in extraction metadata.
    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> CovenantResult<String>;
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &ExtractionConfig) -> CovenantResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CovenantError::configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> CovenantResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.document_text,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CovenantError::external_service("extraction", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("{}: {}", status, error_text.chars().take(500).collect::<String>());
            // Throttling and server faults are transient; anything else will not improve on retry.
            return Err(if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                CovenantError::external_service("extraction", message)
            } else {
                CovenantError::extraction(format!("extraction request rejected: {}", message))
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| CovenantError::external_service("extraction", format!("unreadable response: {}", e)))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CovenantError::extraction(format!("{} returned no content", request.task)))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
