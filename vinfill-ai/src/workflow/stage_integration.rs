//! S5 integration: pure merge of all stage output into an [`EnrichedRecord`]
//!
//! No generation call and no failure mode. Missing fields become empty values;
//! the rating is forced into the rating domain.

use serde_json::{Map, Value};

use super::context::StageContext;
use crate::models::{ConfidenceLevel, EnrichedRecord, Provenance};

pub const MIN_RATING: u8 = 85;
pub const MAX_RATING: u8 = 100;

/// Force a generated rating into [85, 100]; anything unreadable becomes 85
///
/// Accepts numbers and strings such as "92", "92.5" or "93/100".
pub fn clamp_rating(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let leading: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            leading.parse::<f64>().ok()
        }
        _ => None,
    };

    match raw {
        Some(r) if r.is_finite() => r.round().clamp(MIN_RATING as f64, MAX_RATING as f64) as u8,
        _ => MIN_RATING,
    }
}

fn text(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// First non-empty text among `keys`
fn text_any(fields: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .map(|key| text(fields, key))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn optional_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    Some(text(fields, key)).filter(|s| !s.is_empty())
}

fn list(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    match fields.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split([',', ';'])
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Build the committed record from one flat field map
pub fn integrate_fields(
    fields: &Map<String, Value>,
    provenance: Provenance,
    confidence: Option<ConfidenceLevel>,
    disclaimer: Option<String>,
) -> EnrichedRecord {
    EnrichedRecord {
        rating: clamp_rating(fields.get("rating")),
        summary: text_any(fields, &["summary", "narrative"]),
        style: text_any(fields, &["style", "style_classification"]),
        producer_profile: text(fields, "producer_profile"),
        terroir: text(fields, "terroir"),
        vintage_character: text(fields, "vintage_character"),
        appearance: text(fields, "appearance"),
        aroma: text(fields, "aroma"),
        palate: text(fields, "palate"),
        finish: text(fields, "finish"),
        body: text(fields, "body"),
        acidity: text(fields, "acidity"),
        tannin: optional_text(fields, "tannin"),
        flavor_families: list(fields, "flavor_families"),
        food_pairings: list(fields, "food_pairings"),
        serving_temperature: text(fields, "serving_temperature"),
        decanting: text(fields, "decanting"),
        drinking_window: text(fields, "drinking_window"),
        provenance,
        disclaimer,
        confidence,
    }
}

/// Merge S1 to S4 in stage order
pub fn integrate(
    ctx: &StageContext,
    provenance: Provenance,
    confidence: Option<ConfidenceLevel>,
    disclaimer: Option<String>,
) -> EnrichedRecord {
    integrate_fields(&ctx.merged_fields(), provenance, confidence, disclaimer)
}
