//! Confidence gate
//!
//! One low-temperature call asking the model to rate its own knowledge of the
//! item. Only (high, no hallucination risk) proceeds to the verified pipeline;
//! every failure reads as the conservative assessment.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::generation::GenerationService;
use crate::models::{ConfidenceAssessment, ItemDescriptor};
use crate::workflow::prompts::gate_prompt;

/// Routing decision; a rejection is not an error
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Proceed(ConfidenceAssessment),
    Fallback(ConfidenceAssessment),
}

impl GateDecision {
    pub fn from_assessment(assessment: ConfidenceAssessment) -> Self {
        if assessment.permits_pipeline() {
            GateDecision::Proceed(assessment)
        } else {
            GateDecision::Fallback(assessment)
        }
    }

    pub fn assessment(&self) -> &ConfidenceAssessment {
        match self {
            GateDecision::Proceed(a) | GateDecision::Fallback(a) => a,
        }
    }

    pub fn proceeds(&self) -> bool {
        matches!(self, GateDecision::Proceed(_))
    }
}

pub struct ConfidenceGate {
    generation: Arc<GenerationService>,
}

impl ConfidenceGate {
    pub fn new(generation: Arc<GenerationService>) -> Self {
        Self { generation }
    }

    /// Self-assessment for `descriptor`; never fails
    pub async fn assess(&self, descriptor: &ItemDescriptor) -> ConfidenceAssessment {
        let fields = match self.generation.generate_json(&gate_prompt(descriptor)).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!(item = %descriptor.label(), error = %e, "Confidence gate call failed, assuming no confidence");
                return ConfidenceAssessment::conservative(format!("gate call failed: {}", e));
            }
        };

        match serde_json::from_value::<ConfidenceAssessment>(Value::Object(fields)) {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(item = %descriptor.label(), error = %e, "Unparsable confidence assessment, assuming no confidence");
                ConfidenceAssessment::conservative(format!("unparsable assessment: {}", e))
            }
        }
    }

    pub async fn evaluate(&self, descriptor: &ItemDescriptor) -> GateDecision {
        let decision = GateDecision::from_assessment(self.assess(descriptor).await);
        debug!(
            item = %descriptor.label(),
            confidence = decision.assessment().confidence.as_str(),
            hallucination_risk = decision.assessment().hallucination_risk,
            proceeds = decision.proceeds(),
            "Confidence gate decision"
        );
        decision
    }
}
