//! Per-item orchestration: gate, then pipeline or fallback, then persist
//!
//! Runs on a claimed item. Never returns an error: every failure ends with the
//! item committed, released for retry, or marked failed, and is reported as an
//! [`ItemOutcome`].

use std::sync::Arc;
use tracing::{error, info, warn};

use super::confidence_gate::{ConfidenceGate, GateDecision};
use super::fallback_generator::FallbackGenerator;
use crate::db::{ItemRepository, StatusUpdate};
use crate::models::{ConfidenceAssessment, ItemStatus, WorkItem};
use crate::utils::Clock;
use crate::workflow::EnrichmentPipeline;

/// How one item task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Pipeline result committed as `completed_verified`
    Verified,
    /// Gate rejected; fallback result committed as `completed_theoretical`
    Theoretical,
    /// Pipeline aborted; item back in `pending`
    Requeued,
    /// Item ended in `failed`, or could not be persisted
    Failed,
}

pub struct ItemProcessor {
    repo: Arc<dyn ItemRepository>,
    gate: ConfidenceGate,
    pipeline: EnrichmentPipeline,
    fallback: FallbackGenerator,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl ItemProcessor {
    pub fn new(
        repo: Arc<dyn ItemRepository>,
        gate: ConfidenceGate,
        pipeline: EnrichmentPipeline,
        fallback: FallbackGenerator,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        Self {
            repo,
            gate,
            pipeline,
            fallback,
            clock,
            max_attempts,
        }
    }

    /// Process an item this worker has already claimed
    pub async fn process(&self, item: &WorkItem) -> ItemOutcome {
        match self.gate.evaluate(&item.descriptor).await {
            GateDecision::Proceed(assessment) => self.run_pipeline(item, &assessment).await,
            GateDecision::Fallback(assessment) => self.run_fallback(item, &assessment).await,
        }
    }

    async fn run_pipeline(&self, item: &WorkItem, assessment: &ConfidenceAssessment) -> ItemOutcome {
        match self.pipeline.run(item, Some(assessment.confidence)).await {
            Ok(record) => {
                match self
                    .repo
                    .commit_result(item.id, &record, ItemStatus::CompletedVerified)
                    .await
                {
                    Ok(()) => {
                        info!(item_id = %item.id, rating = record.rating, "Committed verified enrichment");
                        ItemOutcome::Verified
                    }
                    Err(e) => {
                        error!(item_id = %item.id, error = %e, "Failed to commit verified enrichment");
                        self.release(item, &format!("commit failed: {}", e)).await;
                        ItemOutcome::Failed
                    }
                }
            }
            Err(e) => match self.release(item, &e.to_string()).await {
                Some(ItemStatus::Pending) => ItemOutcome::Requeued,
                _ => ItemOutcome::Failed,
            },
        }
    }

    async fn run_fallback(&self, item: &WorkItem, assessment: &ConfidenceAssessment) -> ItemOutcome {
        info!(
            item_id = %item.id,
            confidence = assessment.confidence.as_str(),
            hallucination_risk = assessment.hallucination_risk,
            "Confidence gate rejected item, using fallback generator"
        );

        match self.fallback.generate(item, assessment).await {
            Ok(record) => {
                match self
                    .repo
                    .commit_result(item.id, &record, ItemStatus::CompletedTheoretical)
                    .await
                {
                    Ok(()) => {
                        info!(item_id = %item.id, rating = record.rating, "Committed theoretical enrichment");
                        ItemOutcome::Theoretical
                    }
                    Err(e) => {
                        error!(item_id = %item.id, error = %e, "Failed to commit theoretical enrichment");
                        self.release(item, &format!("commit failed: {}", e)).await;
                        ItemOutcome::Failed
                    }
                }
            }
            Err(e) => {
                error!(item_id = %item.id, error = %e, "Fallback generation failed");
                let update = StatusUpdate::completed_at(self.clock.now())
                    .with_error(format!("fallback generation failed: {}", e));
                if let Err(db_err) = self.repo.update_status(item.id, ItemStatus::Failed, update).await {
                    error!(item_id = %item.id, error = %db_err, "Failed to mark item failed");
                }
                ItemOutcome::Failed
            }
        }
    }

    /// Hand the item back; returns where it landed, if the write succeeded
    async fn release(&self, item: &WorkItem, reason: &str) -> Option<ItemStatus> {
        match self.repo.release_for_retry(item.id, reason, self.max_attempts).await {
            Ok(status) => {
                if status == ItemStatus::Failed {
                    error!(
                        item_id = %item.id,
                        max_attempts = self.max_attempts,
                        error = reason,
                        "Item exhausted its attempts, marked failed"
                    );
                } else {
                    warn!(item_id = %item.id, error = reason, "Item released for retry");
                }
                Some(status)
            }
            Err(e) => {
                error!(item_id = %item.id, error = %e, "Failed to release item");
                None
            }
        }
    }
}
