//! Generation service: the only caller of [`GenerationClient`]
//!
//! Per request: cache lookup → for each model in priority order → rate limiter
//! permit → call under a hard timeout → exponential backoff on transient errors.
//! Structured output is repaired once and cached in its repaired form.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::{Map, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::json_repair::parse_json_object;
use super::{GenerationClient, GenerationError, GenerationOptions, GenerationRequest, PromptSpec};
use crate::cache::CacheTier;

/// Timeout and backoff settings for a single model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Hard limit per call; elapsed counts as transient
    pub call_timeout: Duration,
    /// First backoff; doubles per retry
    pub retry_base: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            retry_base: Duration::from_secs(1),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        self.retry_base.saturating_mul(1u32 << retry.min(16))
    }
}

pub struct GenerationService {
    client: Arc<dyn GenerationClient>,
    cache: Arc<CacheTier>,
    models: Vec<String>,
    policy: RetryPolicy,
    rate_limiter: Option<DefaultDirectRateLimiter>,
    cache_ttl: Option<Duration>,
}

impl GenerationService {
    pub fn new(client: Arc<dyn GenerationClient>, cache: Arc<CacheTier>, models: Vec<String>) -> Self {
        Self {
            client,
            cache,
            models,
            policy: RetryPolicy::default(),
            rate_limiter: None,
            cache_ttl: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Limit calls to `per_second` across all items; 0 disables limiting
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.rate_limiter =
            NonZeroU32::new(per_second).map(|n| RateLimiter::direct(Quota::per_second(n)));
        self
    }

    /// TTL for newly cached results; the cache default otherwise
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Free-text generation, cached by (operation, canonical prompt)
    pub async fn generate_text(&self, spec: &PromptSpec) -> Result<String, GenerationError> {
        let request = &spec.request;
        self.cache
            .get_or_compute(
                &request.operation,
                &request.canonical_input(),
                self.cache_ttl,
                || self.call_with_fallback(request, &spec.options),
            )
            .await
    }

    /// JSON-object generation; the repaired object is what gets cached
    pub async fn generate_json(&self, spec: &PromptSpec) -> Result<Map<String, Value>, GenerationError> {
        let request = &spec.request;
        let cached = self
            .cache
            .get_or_compute(
                &request.operation,
                &request.canonical_input(),
                self.cache_ttl,
                || async {
                    let text = self.call_with_fallback(request, &spec.options).await?;
                    let object = parse_json_object(&text)?;
                    Ok(Value::Object(object).to_string())
                },
            )
            .await?;

        parse_json_object(&cached)
    }

    /// Forget the cached answer for `spec`, e.g. after it failed validation
    pub async fn invalidate(&self, spec: &PromptSpec) {
        self.cache
            .invalidate(&spec.request.operation, &spec.request.canonical_input())
            .await;
    }

    /// Walk the model list until one model answers
    async fn call_with_fallback(
        &self,
        request: &GenerationRequest,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let mut last_error = None;

        for model in &self.models {
            match self.call_with_retry(request, model, options).await {
                Ok(text) => return Ok(text),
                Err(GenerationError::ModelUnavailable(msg)) => {
                    warn!(
                        operation = %request.operation,
                        model = %model,
                        error = %msg,
                        "Model unavailable, trying next model"
                    );
                    last_error = Some(GenerationError::ModelUnavailable(msg));
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        operation = %request.operation,
                        model = %model,
                        error = %e,
                        "Retries exhausted, trying next model"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| GenerationError::Fatal("no models configured".to_string())))
    }

    /// One model, with timeout and bounded exponential backoff
    async fn call_with_retry(
        &self,
        request: &GenerationRequest,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let mut retry = 0u32;

        loop {
            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }

            let started = Instant::now();
            let result = match tokio::time::timeout(
                self.policy.call_timeout,
                self.client.generate(request, model, options),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Transient(format!(
                    "call timed out after {} ms",
                    self.policy.call_timeout.as_millis()
                ))),
            };

            match result {
                Ok(output) => {
                    debug!(
                        operation = %request.operation,
                        model = %output.model,
                        attempt = retry + 1,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Generation call succeeded"
                    );
                    return Ok(output.text);
                }
                Err(e) if e.is_transient() && retry < self.policy.max_retries => {
                    let backoff = self.policy.backoff(retry);
                    warn!(
                        operation = %request.operation,
                        model = %model,
                        attempt = retry + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient generation failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ScriptedGenerationClient;
    use crate::utils::SystemClock;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            call_timeout: Duration::from_millis(200),
            retry_base: Duration::from_millis(1),
            max_retries: 2,
        }
    }

    fn service(client: Arc<ScriptedGenerationClient>, models: &[&str]) -> GenerationService {
        let cache = Arc::new(CacheTier::new(16, None, Arc::new(SystemClock)));
        GenerationService::new(client, cache, models.iter().map(|m| m.to_string()).collect())
            .with_retry_policy(fast_policy())
    }

    fn spec(operation: &str) -> PromptSpec {
        PromptSpec {
            request: GenerationRequest::new(operation, "system", "prompt"),
            options: GenerationOptions::json(0.3),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            retry_base: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_transient_errors_retried_then_succeed() {
        let client = Arc::new(
            ScriptedGenerationClient::new()
                .then("op", GenerationError::Transient("429".into()))
                .then("op", GenerationError::Transient("503".into()))
                .respond("op", r#"{"ok": true}"#),
        );
        let service = service(client.clone(), &["primary"]);

        let object = service.generate_json(&spec("op")).await.unwrap();
        assert_eq!(object["ok"], true);
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back_to_next_model() {
        let client = Arc::new(
            ScriptedGenerationClient::new()
                .then("op", GenerationError::Transient("a".into()))
                .then("op", GenerationError::Transient("b".into()))
                .then("op", GenerationError::Transient("c".into()))
                .respond("op", r#"{"ok": 1}"#),
        );
        let service = service(client.clone(), &["primary", "secondary"]);

        service.generate_json(&spec("op")).await.unwrap();

        let models: Vec<String> = client.calls().into_iter().map(|c| c.model).collect();
        assert_eq!(models, vec!["primary", "primary", "primary", "secondary"]);
    }

    #[tokio::test]
    async fn test_unavailable_model_skipped_without_retry() {
        let client = Arc::new(
            ScriptedGenerationClient::new()
                .then("op", GenerationError::ModelUnavailable("404".into()))
                .respond("op", r#"{"ok": 1}"#),
        );
        let service = service(client.clone(), &["gone", "backup"]);

        service.generate_json(&spec("op")).await.unwrap();

        let models: Vec<String> = client.calls().into_iter().map(|c| c.model).collect();
        assert_eq!(models, vec!["gone", "backup"]);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let client = Arc::new(
            ScriptedGenerationClient::new()
                .respond("op", GenerationError::Fatal("401 bad key".into())),
        );
        let service = service(client.clone(), &["primary", "secondary"]);

        let result = service.generate_json(&spec("op")).await;
        assert!(matches!(result, Err(GenerationError::Fatal(_))));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let client = Arc::new(
            ScriptedGenerationClient::new()
                .with_delay(Duration::from_millis(500))
                .respond("op", "{}"),
        );
        let service = service(client.clone(), &["slow"]).with_retry_policy(RetryPolicy {
            call_timeout: Duration::from_millis(20),
            retry_base: Duration::from_millis(1),
            max_retries: 0,
        });

        let result = service.generate_json(&spec("op")).await;
        assert!(matches!(result, Err(GenerationError::Transient(_))));
    }

    #[tokio::test]
    async fn test_repaired_json_is_cached_and_reused() {
        let client = Arc::new(
            ScriptedGenerationClient::new().respond("op", "```json\n{\"aroma\": \"violet\",}\n```"),
        );
        let service = service(client.clone(), &["primary"]);

        let first = service.generate_json(&spec("op")).await.unwrap();
        let second = service.generate_json(&spec("op")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first["aroma"], "violet");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_output_not_cached() {
        let client = Arc::new(
            ScriptedGenerationClient::new()
                .then("op", "definitely not json")
                .respond("op", r#"{"ok": 1}"#),
        );
        let service = service(client.clone(), &["primary"]);

        assert!(matches!(
            service.generate_json(&spec("op")).await,
            Err(GenerationError::Parse(_))
        ));
        assert!(service.generate_json(&spec("op")).await.is_ok());
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_no_models_is_fatal() {
        let client = Arc::new(ScriptedGenerationClient::new());
        let service = service(client, &[]);
        assert!(matches!(
            service.generate_text(&spec("op")).await,
            Err(GenerationError::Fatal(_))
        ));
    }
}
