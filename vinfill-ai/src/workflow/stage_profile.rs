//! S3 detailed profile with length and category consistency validation

use async_trait::async_trait;

use super::context::{StageContext, StageError, StageId, StageResult};
use super::prompts::profile_prompt;
use super::Stage;
use crate::generation::GenerationService;
use crate::validators::{check_domain_consistency, check_min_lengths, PROFILE_MIN_LENGTHS};

pub struct ProfileStage;

#[async_trait]
impl Stage for ProfileStage {
    fn id(&self) -> StageId {
        StageId::Profile
    }

    async fn run(
        &self,
        ctx: &StageContext,
        generation: &GenerationService,
    ) -> Result<StageResult, StageError> {
        let spec = profile_prompt(ctx);
        let fields = generation
            .generate_json(&spec)
            .await
            .map_err(|e| StageError::generation(self.id(), e))?;

        let checked = check_min_lengths(&fields, PROFILE_MIN_LENGTHS)
            .and_then(|()| check_domain_consistency(ctx.descriptor.category, &fields));

        if let Err(issues) = checked {
            // A rejected answer must not be replayed on the next attempt
            generation.invalidate(&spec).await;
            return Err(StageError::validation(self.id(), issues.join("; ")));
        }

        Ok(StageResult::new(self.id(), fields))
    }
}
