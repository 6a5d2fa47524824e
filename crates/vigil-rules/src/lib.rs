//! The reference clinical rule table for Vigil.
//!
//! [`RuleTable`] implements [`vigil_core::snapshot::Classifier`] over four
//! dimensions: hemoglobin state, hematological state, systemic toxicity and
//! treatment. It reads nothing but the feature snapshot it is given.

pub mod codes;
pub mod states;
mod table;

pub use states::Dimension;
pub use table::RuleTable;
