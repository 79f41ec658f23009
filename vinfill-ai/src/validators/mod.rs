//! Validators for detailed-profile output
//!
//! 1. **content_length** - minimum length per required descriptive field
//! 2. **domain_consistency** - flavor families and tannin against the wine category

pub mod content_length;
pub mod domain_consistency;

pub use content_length::{check_min_lengths, MinLength, PROFILE_MIN_LENGTHS};
pub use domain_consistency::{check_domain_consistency, CategoryRules};
