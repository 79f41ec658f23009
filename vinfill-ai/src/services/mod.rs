//! Enrichment services
//!
//! - **confidence_gate** - self-assessment deciding verified vs theoretical path
//! - **fallback_generator** - theoretical profiles for rejected items
//! - **item_processor** - gate → pipeline or fallback → persist, for one item
//! - **enrichment_daemon** - poll loop with a global concurrency cap

pub mod confidence_gate;
pub mod enrichment_daemon;
pub mod fallback_generator;
pub mod item_processor;

pub use confidence_gate::{ConfidenceGate, GateDecision};
pub use enrichment_daemon::{BatchStats, DaemonConfig, DaemonStatus, EnrichmentDaemon};
pub use fallback_generator::{needs_disclaimer, FallbackGenerator, SPARSE_DOCUMENTATION_DISCLAIMER};
pub use item_processor::{ItemOutcome, ItemProcessor};
