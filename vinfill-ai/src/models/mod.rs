//! Data models for vinfill-ai
//!
//! - Work item lifecycle state machine
//! - Confidence self-assessment returned by the gate
//! - The enriched record committed at the end of either path

pub mod assessment;
pub mod enrichment;
pub mod work_item;

pub use assessment::{ConfidenceAssessment, ConfidenceLevel, Recommendation};
pub use enrichment::{EnrichedRecord, Provenance};
pub use work_item::{ItemDescriptor, ItemStatus, StateTransition, WineCategory, WorkItem};
