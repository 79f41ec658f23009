//! Text generation boundary
//!
//! [`GenerationClient`] is one call to one model. [`GenerationService`] layers
//! caching, rate limiting, timeouts, retries and model fallback on top.

pub mod json_repair;
pub mod mock;
pub mod openai;
pub mod service;

pub use mock::{RecordedCall, ScriptedGenerationClient, ScriptedReply};
pub use openai::OpenAiCompatibleClient;
pub use service::{GenerationService, RetryPolicy};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors from the generation service
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Rate limiting, timeouts, 5xx and network trouble; worth retrying
    #[error("Transient generation failure: {0}")]
    Transient(String),

    /// The requested model does not exist or is not served; try the next one
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Generation failed: {0}")]
    Fatal(String),

    /// Output could not be turned into the expected structure
    #[error("Unusable structured output: {0}")]
    Parse(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }

    /// Classify a non-success HTTP response
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, body.chars().take(300).collect::<String>());
        match status {
            408 | 429 => GenerationError::Transient(detail),
            500..=599 => GenerationError::Transient(detail),
            404 => GenerationError::ModelUnavailable(detail),
            400 if body.contains("model_not_found") || body.contains("does not exist") => {
                GenerationError::ModelUnavailable(detail)
            }
            _ => GenerationError::Fatal(detail),
        }
    }
}

/// What to ask for
///
/// `operation` names the caller (gate, stage, fallback) and becomes the cache
/// key prefix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub operation: String,
    pub system: String,
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(
        operation: impl Into<String>,
        system: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            system: system.into(),
            prompt: prompt.into(),
        }
    }

    /// Input hashed into the cache key
    pub fn canonical_input(&self) -> String {
        format!("{}\n\n{}", self.system.trim(), self.prompt.trim())
    }
}

/// Sampling controls for one call
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the service for strict JSON output
    pub json_output: bool,
}

impl GenerationOptions {
    pub fn json(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
            json_output: true,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A request plus its sampling options, as built by prompt functions
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSpec {
    pub request: GenerationRequest,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    /// Model that actually answered
    pub model: String,
}

/// One call against one model of an external text-generation service
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: &GenerationRequest,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationOutput, GenerationError>;
}
