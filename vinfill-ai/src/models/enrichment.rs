//! Enriched record committed to a work item

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ConfidenceLevel;

/// Which path produced the committed content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Five-stage pipeline after a passing confidence gate
    Verified,
    /// Fallback generator after a gate rejection
    Theoretical,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Verified => "verified",
            Provenance::Theoretical => "theoretical",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final merged record; the same field set for both paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// Critic-style score, always within the rating domain
    pub rating: u8,
    pub summary: String,
    pub style: String,
    pub producer_profile: String,
    pub terroir: String,
    pub vintage_character: String,
    pub appearance: String,
    pub aroma: String,
    pub palate: String,
    pub finish: String,
    pub body: String,
    pub acidity: String,
    pub tannin: Option<String>,
    pub flavor_families: Vec<String>,
    pub food_pairings: Vec<String>,
    pub serving_temperature: String,
    pub decanting: String,
    pub drinking_window: String,
    pub provenance: Provenance,
    pub disclaimer: Option<String>,
    pub confidence: Option<ConfidenceLevel>,
}
