//! Scripted generation client for tests and offline runs.
//!
//! Replies are scripted per operation: queued replies are consumed first, then
//! the operation's default reply. Unscripted operations fail fatally. Every
//! call is recorded, and the peak number of simultaneous calls is tracked.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{GenerationClient, GenerationError, GenerationOptions, GenerationOutput, GenerationRequest};

/// One scripted answer
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Error(GenerationError),
}

impl From<&str> for ScriptedReply {
    fn from(text: &str) -> Self {
        ScriptedReply::Text(text.to_string())
    }
}

impl From<String> for ScriptedReply {
    fn from(text: String) -> Self {
        ScriptedReply::Text(text)
    }
}

impl From<serde_json::Value> for ScriptedReply {
    fn from(value: serde_json::Value) -> Self {
        ScriptedReply::Text(value.to_string())
    }
}

impl From<GenerationError> for ScriptedReply {
    fn from(error: GenerationError) -> Self {
        ScriptedReply::Error(error)
    }
}

/// What a call looked like
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: String,
    pub model: String,
    pub prompt: String,
    pub options: GenerationOptions,
}

#[derive(Default)]
pub struct ScriptedGenerationClient {
    queued: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    defaults: Mutex<HashMap<String, ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedGenerationClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call open for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reply used for `operation` whenever nothing is queued
    pub fn respond(self, operation: &str, reply: impl Into<ScriptedReply>) -> Self {
        self.set_default(operation, reply);
        self
    }

    /// Queue a one-shot reply for `operation`
    pub fn then(self, operation: &str, reply: impl Into<ScriptedReply>) -> Self {
        self.push(operation, reply);
        self
    }

    pub fn set_default(&self, operation: &str, reply: impl Into<ScriptedReply>) {
        self.defaults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operation.to_string(), reply.into());
    }

    pub fn push(&self, operation: &str, reply: impl Into<ScriptedReply>) {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(operation.to_string())
            .or_default()
            .push_back(reply.into());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Calls whose operation starts with `prefix`
    pub fn calls_for(&self, prefix: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|call| call.operation.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Highest number of calls that were in progress at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, operation: &str) -> ScriptedReply {
        let queued = self
            .queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(operation)
            .and_then(|replies| replies.pop_front());

        queued
            .or_else(|| {
                self.defaults
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(operation)
                    .cloned()
            })
            .unwrap_or_else(|| {
                ScriptedReply::Error(GenerationError::Fatal(format!(
                    "no scripted reply for operation '{}'",
                    operation
                )))
            })
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerationClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationOutput, GenerationError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                operation: request.operation.clone(),
                model: model.to_string(),
                prompt: request.prompt.clone(),
                options: *options,
            });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.next_reply(&request.operation);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            ScriptedReply::Text(text) => Ok(GenerationOutput {
                text,
                model: model.to_string(),
            }),
            ScriptedReply::Error(error) => Err(error),
        }
    }
}
