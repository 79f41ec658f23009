//! Work item state machine
//!
//! Items progress: PENDING → PROCESSING → COMPLETED_VERIFIED | COMPLETED_THEORETICAL | FAILED.
//! PROCESSING → PENDING on a mid-pipeline error, FAILED → PENDING on manual retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::EnrichedRecord;

/// Lifecycle state of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting to be claimed
    Pending,
    /// Claimed by exactly one worker
    Processing,
    /// Enriched through the five-stage pipeline
    CompletedVerified,
    /// Enriched through the fallback generator
    CompletedTheoretical,
    /// Gave up; only a manual retry moves it again
    Failed,
}

impl ItemStatus {
    /// Column value stored in `work_items.status`
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::CompletedVerified => "completed_verified",
            ItemStatus::CompletedTheoretical => "completed_theoretical",
            ItemStatus::Failed => "failed",
        }
    }

    /// Whether the lifecycle graph has an edge `self → next`
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, CompletedVerified)
                | (Processing, CompletedTheoretical)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Failed, Pending)
        )
    }

    /// States the given status may be entered from
    pub fn predecessors(next: ItemStatus) -> Vec<ItemStatus> {
        [
            ItemStatus::Pending,
            ItemStatus::Processing,
            ItemStatus::CompletedVerified,
            ItemStatus::CompletedTheoretical,
            ItemStatus::Failed,
        ]
        .into_iter()
        .filter(|from| from.can_transition_to(next))
        .collect()
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            ItemStatus::CompletedVerified | ItemStatus::CompletedTheoretical
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "processing" => Ok(ItemStatus::Processing),
            "completed_verified" => Ok(ItemStatus::CompletedVerified),
            "completed_theoretical" => Ok(ItemStatus::CompletedTheoretical),
            "failed" => Ok(ItemStatus::Failed),
            other => Err(format!("unknown item status: {}", other)),
        }
    }
}

/// Style category of a wine; drives the domain-consistency table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WineCategory {
    Red,
    White,
    Rose,
    Sparkling,
    Dessert,
    Fortified,
    Other,
}

impl WineCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WineCategory::Red => "red",
            WineCategory::White => "white",
            WineCategory::Rose => "rose",
            WineCategory::Sparkling => "sparkling",
            WineCategory::Dessert => "dessert",
            WineCategory::Fortified => "fortified",
            WineCategory::Other => "other",
        }
    }

    /// Lenient parse of menu text; anything unrecognized is `Other`
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "red" | "rouge" | "tinto" | "rosso" => WineCategory::Red,
            "white" | "blanc" | "blanco" | "bianco" => WineCategory::White,
            "rose" | "rosé" | "rosado" | "rosato" => WineCategory::Rose,
            "sparkling" | "champagne" | "cava" | "prosecco" | "cremant" | "crémant" => {
                WineCategory::Sparkling
            }
            "dessert" | "sweet" => WineCategory::Dessert,
            "fortified" | "port" | "sherry" | "madeira" => WineCategory::Fortified,
            _ => WineCategory::Other,
        }
    }
}

impl fmt::Display for WineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor fields known before enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub name: String,
    #[serde(default)]
    pub producer: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub grape: Option<String>,
    pub category: WineCategory,
    #[serde(default)]
    pub vintage: Option<i32>,
}

impl ItemDescriptor {
    pub fn new(name: impl Into<String>, category: WineCategory) -> Self {
        Self {
            name: name.into(),
            producer: None,
            region: None,
            country: None,
            grape: None,
            category,
            vintage: None,
        }
    }

    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_grape(mut self, grape: impl Into<String>) -> Self {
        self.grape = Some(grape.into());
        self
    }

    pub fn with_vintage(mut self, vintage: i32) -> Self {
        self.vintage = Some(vintage);
        self
    }

    /// Single-line label used in prompts and logs
    pub fn label(&self) -> String {
        let mut label = String::new();
        if let Some(producer) = &self.producer {
            label.push_str(producer);
            label.push(' ');
        }
        label.push_str(&self.name);
        if let Some(vintage) = self.vintage {
            label.push_str(&format!(" {}", vintage));
        } else {
            label.push_str(" NV");
        }
        label
    }
}

/// A record awaiting or undergoing enrichment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub descriptor: ItemDescriptor,
    pub status: ItemStatus,
    /// Number of times the item has been claimed
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Populated only by the final commit
    pub enrichment: Option<EnrichedRecord>,
}

/// Audit row for one status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub item_id: Uuid,
    pub from: ItemStatus,
    pub to: ItemStatus,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use ItemStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(CompletedVerified));
        assert!(Processing.can_transition_to(CompletedTheoretical));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_pending_never_completes_directly() {
        use ItemStatus::*;
        assert!(!Pending.can_transition_to(CompletedVerified));
        assert!(!Pending.can_transition_to(CompletedTheoretical));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!CompletedVerified.can_transition_to(Pending));
    }

    #[test]
    fn test_predecessors_of_pending() {
        let preds = ItemStatus::predecessors(ItemStatus::Pending);
        assert_eq!(preds, vec![ItemStatus::Processing, ItemStatus::Failed]);
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            ItemStatus::Pending,
            ItemStatus::Processing,
            ItemStatus::CompletedVerified,
            ItemStatus::CompletedTheoretical,
            ItemStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
        assert!("done".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_category_lenient_parse() {
        assert_eq!(WineCategory::parse_lenient("Rosé"), WineCategory::Rose);
        assert_eq!(WineCategory::parse_lenient(" Champagne "), WineCategory::Sparkling);
        assert_eq!(WineCategory::parse_lenient("orange"), WineCategory::Other);
    }

    #[test]
    fn test_label() {
        let descriptor = ItemDescriptor::new("Barolo Cannubi", WineCategory::Red)
            .with_producer("Brezza")
            .with_vintage(2016);
        assert_eq!(descriptor.label(), "Brezza Barolo Cannubi 2016");

        let nv = ItemDescriptor::new("Brut Reserve", WineCategory::Sparkling);
        assert_eq!(nv.label(), "Brut Reserve NV");
    }
}
