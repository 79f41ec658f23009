//! Stage identity, threaded context and stage errors

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::generation::GenerationError;
use crate::models::ItemDescriptor;

/// The five pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Research,
    Analysis,
    Profile,
    Application,
    Integration,
}

impl StageId {
    /// 1-based position in the pipeline
    pub fn index(&self) -> u8 {
        match self {
            StageId::Research => 1,
            StageId::Analysis => 2,
            StageId::Profile => 3,
            StageId::Application => 4,
            StageId::Integration => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageId::Research => "research",
            StageId::Analysis => "analysis",
            StageId::Profile => "profile",
            StageId::Application => "application",
            StageId::Integration => "integration",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{} {}", self.index(), self.name())
    }
}

/// Named fields produced by one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub stage: StageId,
    pub fields: Map<String, Value>,
}

impl StageResult {
    pub fn new(stage: StageId, fields: Map<String, Value>) -> Self {
        Self { stage, fields }
    }
}

/// Everything a stage may build on: the item and all prior stage output
#[derive(Debug, Clone)]
pub struct StageContext {
    pub item_id: Uuid,
    pub descriptor: ItemDescriptor,
    prior: Vec<StageResult>,
}

impl StageContext {
    pub fn new(item_id: Uuid, descriptor: ItemDescriptor) -> Self {
        Self {
            item_id,
            descriptor,
            prior: Vec::new(),
        }
    }

    pub fn push(&mut self, result: StageResult) {
        self.prior.push(result);
    }

    pub fn prior(&self) -> &[StageResult] {
        &self.prior
    }

    pub fn result(&self, stage: StageId) -> Option<&StageResult> {
        self.prior.iter().find(|r| r.stage == stage)
    }

    /// All prior fields in one object; later stages win on key collisions
    pub fn merged_fields(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for result in &self.prior {
            for (key, value) in &result.fields {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Prior output serialized for inclusion in a prompt, keyed by stage name
    pub fn prior_json(&self) -> String {
        let by_stage: Map<String, Value> = self
            .prior
            .iter()
            .map(|r| (r.stage.name().to_string(), Value::Object(r.fields.clone())))
            .collect();
        serde_json::to_string_pretty(&Value::Object(by_stage)).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage}: generation failed: {source}")]
    Generation {
        stage: StageId,
        #[source]
        source: GenerationError,
    },

    #[error("{stage}: validation failed: {message}")]
    Validation { stage: StageId, message: String },

    #[error("{stage}: response contained no usable fields")]
    EmptyResponse { stage: StageId },
}

impl StageError {
    pub fn generation(stage: StageId, source: GenerationError) -> Self {
        StageError::Generation { stage, source }
    }

    pub fn validation(stage: StageId, message: impl Into<String>) -> Self {
        StageError::Validation {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> StageId {
        match self {
            StageError::Generation { stage, .. }
            | StageError::Validation { stage, .. }
            | StageError::EmptyResponse { stage } => *stage,
        }
    }
}

/// True when at least one field holds something other than null, "" or []
pub fn has_content(fields: &Map<String, Value>) -> bool {
    fields.values().any(value_has_content)
}

pub fn value_has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(value_has_content),
        Value::Object(map) => has_content(map),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WineCategory;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(StageId::Profile.to_string(), "S3 profile");
        assert_eq!(StageId::Integration.index(), 5);
    }

    #[test]
    fn test_merged_fields_later_stage_wins() {
        let mut ctx = StageContext::new(
            Uuid::new_v4(),
            ItemDescriptor::new("Chablis", WineCategory::White),
        );
        ctx.push(StageResult::new(StageId::Research, fields(json!({"style": "lean", "rating": 90}))));
        ctx.push(StageResult::new(StageId::Analysis, fields(json!({"style": "mineral"}))));

        let merged = ctx.merged_fields();
        assert_eq!(merged["style"], "mineral");
        assert_eq!(merged["rating"], 90);
        assert!(ctx.prior_json().contains("\"research\""));
    }

    #[test]
    fn test_has_content() {
        assert!(!has_content(&fields(json!({}))));
        assert!(!has_content(&fields(json!({"a": "", "b": [], "c": null}))));
        assert!(has_content(&fields(json!({"a": "", "b": ["x"]}))));
    }
}
