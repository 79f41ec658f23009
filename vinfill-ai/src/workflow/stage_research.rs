//! S1 initial research: rating, summary, style, producer profile

use async_trait::async_trait;

use super::context::{has_content, StageContext, StageError, StageId, StageResult};
use super::prompts::research_prompt;
use super::Stage;
use crate::generation::GenerationService;

pub struct ResearchStage;

#[async_trait]
impl Stage for ResearchStage {
    fn id(&self) -> StageId {
        StageId::Research
    }

    async fn run(
        &self,
        ctx: &StageContext,
        generation: &GenerationService,
    ) -> Result<StageResult, StageError> {
        let spec = research_prompt(ctx);
        let fields = generation
            .generate_json(&spec)
            .await
            .map_err(|e| StageError::generation(self.id(), e))?;

        if !has_content(&fields) {
            generation.invalidate(&spec).await;
            return Err(StageError::EmptyResponse { stage: self.id() });
        }

        Ok(StageResult::new(self.id(), fields))
    }
}
