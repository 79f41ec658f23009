//! Five-stage enrichment pipeline
//!
//! Stages run strictly in order and every stage prompt carries the output of
//! all stages before it:
//! 1. **Research** - rating, summary, style, producer profile
//! 2. **Analysis** - classification, deep mining and narrative phases
//! 3. **Profile** - tasting profile, length- and category-validated
//! 4. **Application** - pairings, serving temperature, decanting, drinking window
//! 5. **Integration** - pure merge into an [`EnrichedRecord`]
//!
//! Any stage error aborts the run; nothing partial leaves the pipeline.

pub mod context;
pub mod prompts;
pub mod stage_analysis;
pub mod stage_application;
pub mod stage_integration;
pub mod stage_profile;
pub mod stage_research;

pub use context::{StageContext, StageError, StageId, StageResult};
pub use stage_integration::{clamp_rating, integrate, integrate_fields};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::generation::GenerationService;
use crate::models::{ConfidenceLevel, EnrichedRecord, Provenance, WorkItem};

/// One generating stage (S1 to S4)
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn run(
        &self,
        ctx: &StageContext,
        generation: &GenerationService,
    ) -> Result<StageResult, StageError>;
}

pub struct EnrichmentPipeline {
    generation: Arc<GenerationService>,
    stages: Vec<Box<dyn Stage>>,
}

impl EnrichmentPipeline {
    pub fn new(generation: Arc<GenerationService>) -> Self {
        Self {
            generation,
            stages: vec![
                Box::new(stage_research::ResearchStage),
                Box::new(stage_analysis::AnalysisStage),
                Box::new(stage_profile::ProfileStage),
                Box::new(stage_application::ApplicationStage),
            ],
        }
    }

    /// Run every stage for `item` and merge the result
    pub async fn run(
        &self,
        item: &WorkItem,
        confidence: Option<ConfidenceLevel>,
    ) -> Result<EnrichedRecord, StageError> {
        let started = Instant::now();
        let mut ctx = StageContext::new(item.id, item.descriptor.clone());

        for stage in &self.stages {
            let stage_started = Instant::now();
            let result = stage.run(&ctx, &self.generation).await.map_err(|e| {
                error!(
                    item_id = %item.id,
                    stage = stage.id().index(),
                    error = %e,
                    "Pipeline stage failed"
                );
                e
            })?;

            debug!(
                item_id = %item.id,
                stage = stage.id().index(),
                fields = result.fields.len(),
                elapsed_ms = stage_started.elapsed().as_millis() as u64,
                "Pipeline stage complete"
            );
            ctx.push(result);
        }

        let record = integrate(&ctx, Provenance::Verified, confidence, None);
        info!(
            item_id = %item.id,
            rating = record.rating,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline complete"
        );
        Ok(record)
    }
}
