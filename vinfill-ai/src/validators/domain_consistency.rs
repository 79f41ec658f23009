//! Category consistency of the detailed profile
//!
//! Each wine category has a closed set of flavor families and a tannin rule.
//! A white wine described with "black fruit" and firm tannins is a sign the
//! model confused the item with something else.

use serde_json::{Map, Value};

use crate::models::WineCategory;

/// Whether a category carries a tannin description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TanninRule {
    /// Must be present and non-empty
    Required,
    /// May be present or absent
    Optional,
    /// Must be absent, empty or a "none"-style placeholder
    NotApplicable,
}

#[derive(Debug, Clone, Copy)]
pub struct CategoryRules {
    /// `None` means any family is accepted
    pub flavor_families: Option<&'static [&'static str]>,
    pub tannin: TanninRule,
}

const RED: &[&str] = &[
    "red fruit", "black fruit", "dried fruit", "floral", "herbal", "spice", "earth", "oak",
    "mineral", "savory",
];
const WHITE: &[&str] = &[
    "citrus", "orchard fruit", "stone fruit", "tropical fruit", "floral", "herbal", "mineral",
    "oak", "nutty", "honey", "spice",
];
const ROSE: &[&str] = &[
    "red fruit", "citrus", "stone fruit", "orchard fruit", "floral", "herbal", "mineral", "spice",
];
const SPARKLING: &[&str] = &[
    "citrus", "orchard fruit", "stone fruit", "red fruit", "floral", "mineral", "autolytic",
    "nutty", "honey",
];
const DESSERT: &[&str] = &[
    "dried fruit", "stone fruit", "tropical fruit", "citrus", "honey", "nutty", "spice", "floral",
    "oak",
];
const FORTIFIED: &[&str] = &[
    "dried fruit", "black fruit", "red fruit", "nutty", "spice", "oak", "earth", "honey", "savory",
];

/// Placeholder values that mean "no tannin"
const NO_TANNIN: &[&str] = &["none", "n/a", "na", "not applicable", "-"];

impl CategoryRules {
    pub fn for_category(category: WineCategory) -> Self {
        use TanninRule::*;
        match category {
            WineCategory::Red => Self { flavor_families: Some(RED), tannin: Required },
            WineCategory::White => Self { flavor_families: Some(WHITE), tannin: NotApplicable },
            WineCategory::Rose => Self { flavor_families: Some(ROSE), tannin: Optional },
            WineCategory::Sparkling => Self { flavor_families: Some(SPARKLING), tannin: NotApplicable },
            WineCategory::Dessert => Self { flavor_families: Some(DESSERT), tannin: Optional },
            WineCategory::Fortified => Self { flavor_families: Some(FORTIFIED), tannin: Optional },
            WineCategory::Other => Self { flavor_families: None, tannin: Optional },
        }
    }
}

fn normalize(family: &str) -> String {
    family.trim().to_lowercase().replace(['-', '_'], " ")
}

/// Check flavor families and tannin against the category table
pub fn check_domain_consistency(
    category: WineCategory,
    fields: &Map<String, Value>,
) -> Result<(), Vec<String>> {
    let rules = CategoryRules::for_category(category);
    let mut issues = Vec::new();

    let families: Vec<String> = match fields.get("flavor_families") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(normalize)
            .filter(|f| !f.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    if families.is_empty() {
        issues.push("flavor_families must list at least one family".to_string());
    } else if let Some(allowed) = rules.flavor_families {
        for family in &families {
            if !allowed.contains(&family.as_str()) {
                issues.push(format!("flavor family '{}' is not typical of {} wine", family, category));
            }
        }
    }

    let tannin = fields
        .get("tannin")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty() && !NO_TANNIN.contains(&t.to_lowercase().as_str()));

    match (rules.tannin, tannin) {
        (TanninRule::Required, None) => {
            issues.push(format!("tannin is required for {} wine", category));
        }
        (TanninRule::NotApplicable, Some(value)) => {
            issues.push(format!("tannin '{}' does not apply to {} wine", value, category));
        }
        _ => {}
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_red_with_tannin_passes() {
        let f = fields(json!({"flavor_families": ["Red Fruit", "earth"], "tannin": "Firm, fine-grained"}));
        assert!(check_domain_consistency(WineCategory::Red, &f).is_ok());
    }

    #[test]
    fn test_red_without_tannin_fails() {
        let f = fields(json!({"flavor_families": ["red fruit"], "tannin": "none"}));
        let issues = check_domain_consistency(WineCategory::Red, &f).unwrap_err();
        assert!(issues[0].contains("tannin is required"));
    }

    #[test]
    fn test_white_with_tannin_fails() {
        let f = fields(json!({"flavor_families": ["citrus"], "tannin": "Grippy"}));
        assert!(check_domain_consistency(WineCategory::White, &f).is_err());

        let ok = fields(json!({"flavor_families": ["citrus"], "tannin": "N/A"}));
        assert!(check_domain_consistency(WineCategory::White, &ok).is_ok());
    }

    #[test]
    fn test_foreign_family_rejected() {
        let f = fields(json!({"flavor_families": ["citrus", "black fruit"]}));
        let issues = check_domain_consistency(WineCategory::Sparkling, &f).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("black fruit"));
    }

    #[test]
    fn test_missing_families_rejected() {
        let f = fields(json!({"tannin": "soft"}));
        assert!(check_domain_consistency(WineCategory::Rose, &f).is_err());
    }

    #[test]
    fn test_other_category_accepts_any_family() {
        let f = fields(json!({"flavor_families": ["skin-contact", "tea"]}));
        assert!(check_domain_consistency(WineCategory::Other, &f).is_ok());
    }
}
