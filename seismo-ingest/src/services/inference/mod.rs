//! Impact inference
//!
//! Turns an event's parameters into per-country impact assessments by asking
//! a chat-completion model, then validating and correcting what comes back.
//! [`ImpactInferenceClient::infer_impact`] never fails: every error path
//! (no token, network failure, non-503 HTTP error, unparseable or empty
//! output) resolves to [`corrections::fallback_estimation`].

pub mod client;
pub mod corrections;
pub mod prompt;
pub mod response;

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use seismo_common::ImpactAssessment;

use client::{ChatCompletion, ChatMessage, ChatRequest, InferenceError};

/// Warm-up retries after an HTTP 503 before giving up
pub const MAX_WARMUP_RETRIES: u32 = 1;

/// Delay before retrying a model that is still loading
pub const WARMUP_RETRY_DELAY: Duration = Duration::from_secs(20);

/// Prior activity near an event, included in the prompt when available
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalContext {
    pub summary: Option<String>,
    /// One line per prior event
    pub prior_events: Vec<String>,
}

/// Parameters of one assessment request
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub magnitude: f64,
    pub depth_km: f64,
    pub radius_km: f64,
    pub place: String,
    pub historical_context: Option<HistoricalContext>,
}

impl InferenceRequest {
    /// Stable text form of the parameters that determine the model's answer
    ///
    /// Historical context is excluded; it only calibrates the model.
    pub fn canonical_key(&self, model: &str) -> String {
        format!(
            "{}|{:.4}|{:.4}|{:.1}|{:.2}|{:.2}|{}",
            model,
            self.latitude,
            self.longitude,
            self.magnitude,
            self.depth_km,
            self.radius_km,
            self.place.trim()
        )
    }
}

/// Where an assessment list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceSource {
    /// Model output (possibly corrected)
    Model,
    /// Rule-based estimate
    Fallback,
}

/// Result of one inference
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub impacts: Vec<ImpactAssessment>,
    pub source: InferenceSource,
}

/// Impact inference over an optional chat-completion transport
///
/// Without a transport (no API token configured) every request goes
/// straight to the fallback estimate.
#[derive(Clone)]
pub struct ImpactInferenceClient {
    transport: Option<Arc<dyn ChatCompletion>>,
    retry_delay: Duration,
}

impl ImpactInferenceClient {
    pub fn new(transport: Option<Arc<dyn ChatCompletion>>) -> Self {
        if transport.is_none() {
            warn!("No inference API token configured; impact assessments will use fallback estimation");
        }
        Self {
            transport,
            retry_delay: WARMUP_RETRY_DELAY,
        }
    }

    /// Override the 503 warm-up delay
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Model identifier, or `None` in fallback-only mode
    pub fn model_name(&self) -> Option<&str> {
        self.transport.as_deref().map(|t| t.model_name())
    }

    /// Assess impact for one event
    pub async fn infer_impact(&self, request: &InferenceRequest) -> InferenceOutcome {
        let Some(transport) = &self.transport else {
            return fallback(request);
        };

        let chat = ChatRequest::new(vec![
            ChatMessage::system(prompt::system_message()),
            ChatMessage::user(prompt::user_message(request)),
        ]);

        let text = match self.complete_with_warmup(transport.as_ref(), &chat).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Inference request failed, using fallback");
                return fallback(request);
            }
        };

        tracing::debug!(text = %truncate(&text, 200), "Generated text");

        let mut impacts = response::parse_impacts(&text);
        if impacts.is_empty() {
            warn!("Model returned empty or invalid response, using fallback");
            return fallback(request);
        }

        corrections::apply_corrections(&mut impacts, request.magnitude, request.depth_km);

        info!(countries = impacts.len(), "Impact assessment inferred by model");
        InferenceOutcome {
            impacts,
            source: InferenceSource::Model,
        }
    }

    /// Call the transport, retrying a bounded number of times while the model loads
    async fn complete_with_warmup(
        &self,
        transport: &dyn ChatCompletion,
        chat: &ChatRequest,
    ) -> Result<String, InferenceError> {
        let mut retries = 0;
        loop {
            match transport.complete(chat).await {
                Err(InferenceError::ModelLoading) if retries < MAX_WARMUP_RETRIES => {
                    retries += 1;
                    warn!(delay = ?self.retry_delay, attempt = retries, "Model is loading, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }
}

fn fallback(request: &InferenceRequest) -> InferenceOutcome {
    InferenceOutcome {
        impacts: corrections::fallback_estimation(request.magnitude, request.depth_km),
        source: InferenceSource::Fallback,
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
