//! S2 deep analysis
//!
//! Three phases run in order: classification, deep mining, narrative synthesis.
//! Each phase sees the output of the phases before it. A failed phase is
//! logged and skipped; the stage only fails when no phase produced anything.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use super::context::{has_content, StageContext, StageError, StageId, StageResult};
use super::prompts::{analysis_phase_prompt, AnalysisPhase};
use super::Stage;
use crate::generation::GenerationService;

pub struct AnalysisStage;

#[async_trait]
impl Stage for AnalysisStage {
    fn id(&self) -> StageId {
        StageId::Analysis
    }

    async fn run(
        &self,
        ctx: &StageContext,
        generation: &GenerationService,
    ) -> Result<StageResult, StageError> {
        let mut fields: Map<String, Value> = Map::new();
        let mut last_error = None;

        for phase in AnalysisPhase::ALL {
            let spec = analysis_phase_prompt(ctx, phase, &fields);
            match generation.generate_json(&spec).await {
                Ok(phase_fields) if has_content(&phase_fields) => {
                    fields.extend(phase_fields);
                }
                Ok(_) => {
                    warn!(
                        item_id = %ctx.item_id,
                        stage = self.id().index(),
                        phase = phase.name(),
                        "Analysis phase returned no content, skipping"
                    );
                    generation.invalidate(&spec).await;
                    last_error = Some(StageError::EmptyResponse { stage: self.id() });
                }
                Err(e) => {
                    warn!(
                        item_id = %ctx.item_id,
                        stage = self.id().index(),
                        phase = phase.name(),
                        error = %e,
                        "Analysis phase failed, continuing with remaining phases"
                    );
                    last_error = Some(StageError::generation(self.id(), e));
                }
            }
        }

        if fields.is_empty() {
            return Err(last_error.unwrap_or(StageError::EmptyResponse { stage: self.id() }));
        }

        Ok(StageResult::new(self.id(), fields))
    }
}
