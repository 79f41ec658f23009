//! Confidence self-assessment returned by the gate call

use serde::{Deserialize, Serialize};

/// Self-reported knowledge level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    None,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::None => "none",
        }
    }
}

/// What the model suggests doing with its own output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    UseGenerated,
    SeekOtherSources,
    InsufficientInfo,
}

/// Ephemeral gate result; never persisted beyond the routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub knowledge_exists: bool,
    pub confidence: ConfidenceLevel,
    pub hallucination_risk: bool,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub concerns: Option<String>,
}

impl ConfidenceAssessment {
    /// Assessment used whenever the gate call or its parse fails
    pub fn conservative(concerns: impl Into<String>) -> Self {
        Self {
            knowledge_exists: false,
            confidence: ConfidenceLevel::None,
            hallucination_risk: true,
            recommendation: Recommendation::InsufficientInfo,
            concerns: Some(concerns.into()),
        }
    }

    /// Only (high, no hallucination risk) may run the verified pipeline
    pub fn permits_pipeline(&self) -> bool {
        self.confidence == ConfidenceLevel::High && !self.hallucination_risk
    }
}
