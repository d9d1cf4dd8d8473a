//! Chat-completion transport
//!
//! [`ChatCompletion`] is the seam between the impact inference logic and the
//! network. [`HuggingFaceTransport`] talks to the Hugging Face router's
//! OpenAI-compatible chat endpoint.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Sampling parameters sent with every assessment request
pub const MAX_TOKENS: u32 = 2500;
pub const TEMPERATURE: f32 = 0.3;
pub const TOP_P: f32 = 0.9;

/// Inference transport errors
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Network error: {0}")]
    NetworkError(String),

    /// HTTP 503: the hosted model is still loading
    #[error("Model is loading")]
    ModelLoading,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// One chat-completion call
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
        }
    }
}

/// Anything that can turn a chat request into generated text
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Generated text of the first choice
    async fn complete(&self, request: &ChatRequest) -> Result<String, InferenceError>;

    /// Model identifier, part of the inference cache key
    fn model_name(&self) -> &str;
}

/// Hugging Face router chat-completions client
pub struct HuggingFaceTransport {
    http_client: reqwest::Client,
    url: String,
    api_token: String,
    model: String,
}

impl HuggingFaceTransport {
    pub fn new(
        url: impl Into<String>,
        api_token: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, InferenceError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| InferenceError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.into(),
            api_token: api_token.into(),
            model: model.into(),
        })
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
        })
    }
}

#[async_trait]
impl ChatCompletion for HuggingFaceTransport {
    async fn complete(&self, request: &ChatRequest) -> Result<String, InferenceError> {
        tracing::debug!(url = %self.url, model = %self.model, "Requesting impact assessment");

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.api_token)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| InferenceError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 503 {
            return Err(InferenceError::ModelLoading);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::ApiError(status.as_u16(), error_text));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InferenceError::ParseError(e.to_string()))?;

        tracing::info!(
            model = body.get("model").and_then(|m| m.as_str()).unwrap_or("unknown"),
            "Received response from inference API"
        );

        body.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| InferenceError::ParseError("Response missing message content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
