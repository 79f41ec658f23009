//! Minimum-length checks on generated text fields

use serde_json::{Map, Value};

/// Required field with its minimum trimmed character count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinLength {
    pub field: &'static str,
    pub min_chars: usize,
}

/// Required fields of the detailed profile
pub const PROFILE_MIN_LENGTHS: &[MinLength] = &[
    MinLength { field: "appearance", min_chars: 10 },
    MinLength { field: "aroma", min_chars: 30 },
    MinLength { field: "palate", min_chars: 30 },
    MinLength { field: "finish", min_chars: 15 },
    MinLength { field: "body", min_chars: 3 },
    MinLength { field: "acidity", min_chars: 3 },
];

/// Check every rule; missing or non-string fields count as empty
///
/// Returns one message per violation.
pub fn check_min_lengths(fields: &Map<String, Value>, rules: &[MinLength]) -> Result<(), Vec<String>> {
    let violations: Vec<String> = rules
        .iter()
        .filter_map(|rule| {
            let actual = fields
                .get(rule.field)
                .and_then(Value::as_str)
                .map(|s| s.trim().chars().count())
                .unwrap_or(0);

            (actual < rule.min_chars).then(|| {
                format!(
                    "{} has {} characters, minimum is {}",
                    rule.field, actual, rule.min_chars
                )
            })
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
