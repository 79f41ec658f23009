//! S4 application analysis: pairings, serving and cellaring advice

use async_trait::async_trait;

use super::context::{value_has_content, StageContext, StageError, StageId, StageResult};
use super::prompts::application_prompt;
use super::Stage;
use crate::generation::GenerationService;

const APPLICATION_FIELDS: [&str; 4] = [
    "food_pairings",
    "serving_temperature",
    "decanting",
    "drinking_window",
];

pub struct ApplicationStage;

#[async_trait]
impl Stage for ApplicationStage {
    fn id(&self) -> StageId {
        StageId::Application
    }

    async fn run(
        &self,
        ctx: &StageContext,
        generation: &GenerationService,
    ) -> Result<StageResult, StageError> {
        let spec = application_prompt(ctx);
        let fields = generation
            .generate_json(&spec)
            .await
            .map_err(|e| StageError::generation(self.id(), e))?;

        let any_filled = APPLICATION_FIELDS
            .iter()
            .any(|key| fields.get(*key).map(value_has_content).unwrap_or(false));
        if !any_filled {
            generation.invalidate(&spec).await;
            return Err(StageError::EmptyResponse { stage: self.id() });
        }

        Ok(StageResult::new(self.id(), fields))
    }
}
