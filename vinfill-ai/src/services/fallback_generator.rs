//! Theoretical profiles for items the confidence gate rejected
//!
//! One generation call produces the full field set, merged through the same
//! integration as the verified pipeline but marked `theoretical`.

use chrono::Datelike;
use std::sync::Arc;
use tracing::info;

use crate::generation::{GenerationError, GenerationService};
use crate::models::{ConfidenceAssessment, EnrichedRecord, ItemDescriptor, Provenance, WorkItem};
use crate::utils::Clock;
use crate::workflow::integrate_fields;
use crate::workflow::prompts::fallback_prompt;

/// Attached when documentation for the item is likely sparse
pub const SPARSE_DOCUMENTATION_DISCLAIMER: &str = "Limited documentation exists for this wine. \
    This profile is an informed estimate based on its producer, region, grape and style, not \
    verified tasting notes.";

/// Vintages at least this old are thinly documented
pub const OLD_VINTAGE_YEARS: i32 = 20;
/// Vintages at most this old have few published notes yet
pub const YOUNG_VINTAGE_YEARS: i32 = 1;

fn is_unknown(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None => true,
        Some(v) => v.is_empty() || v.eq_ignore_ascii_case("unknown"),
    }
}

/// Rule-based disclaimer decision, relative to `current_year`
pub fn needs_disclaimer(descriptor: &ItemDescriptor, current_year: i32) -> bool {
    let vintage_sparse = match descriptor.vintage {
        None => true,
        Some(vintage) => {
            let age = current_year - vintage;
            age >= OLD_VINTAGE_YEARS || age <= YOUNG_VINTAGE_YEARS
        }
    };

    vintage_sparse
        || is_unknown(descriptor.producer.as_deref())
        || is_unknown(descriptor.region.as_deref())
}

pub struct FallbackGenerator {
    generation: Arc<GenerationService>,
    clock: Arc<dyn Clock>,
}

impl FallbackGenerator {
    pub fn new(generation: Arc<GenerationService>, clock: Arc<dyn Clock>) -> Self {
        Self { generation, clock }
    }

    pub async fn generate(
        &self,
        item: &WorkItem,
        assessment: &ConfidenceAssessment,
    ) -> Result<EnrichedRecord, GenerationError> {
        let fields = self
            .generation
            .generate_json(&fallback_prompt(&item.descriptor))
            .await?;

        let disclaimer = needs_disclaimer(&item.descriptor, self.clock.now().year())
            .then(|| SPARSE_DOCUMENTATION_DISCLAIMER.to_string());

        let record = integrate_fields(
            &fields,
            Provenance::Theoretical,
            Some(assessment.confidence),
            disclaimer,
        );

        info!(
            item_id = %item.id,
            rating = record.rating,
            disclaimer = record.disclaimer.is_some(),
            "Generated theoretical profile"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WineCategory;

    fn documented() -> ItemDescriptor {
        ItemDescriptor::new("Barolo Cannubi", WineCategory::Red)
            .with_producer("Brezza")
            .with_region("Piedmont")
            .with_vintage(2016)
    }

    #[test]
    fn test_documented_item_needs_no_disclaimer() {
        assert!(!needs_disclaimer(&documented(), 2024));
    }

    #[test]
    fn test_vintage_age_boundaries() {
        let at = |vintage| needs_disclaimer(&documented().with_vintage(vintage), 2024);
        assert!(at(2004), "20 years old");
        assert!(!at(2005), "19 years old");
        assert!(!at(2022), "2 years old");
        assert!(at(2023), "1 year old");
        assert!(at(2025), "future vintage");
    }

    #[test]
    fn test_missing_vintage_needs_disclaimer() {
        let mut descriptor = documented();
        descriptor.vintage = None;
        assert!(needs_disclaimer(&descriptor, 2024));
    }

    #[test]
    fn test_unknown_producer_or_region_needs_disclaimer() {
        let mut descriptor = documented();
        descriptor.producer = None;
        assert!(needs_disclaimer(&descriptor, 2024));

        let descriptor = documented().with_region("Unknown");
        assert!(needs_disclaimer(&descriptor, 2024));

        let descriptor = documented().with_producer("  ");
        assert!(needs_disclaimer(&descriptor, 2024));
    }
}
