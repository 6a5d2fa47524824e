//! Test codes read by the rule table.

/// Hemoglobin, g/dL (LOINC).
pub const HEMOGLOBIN: &str = "718-7";
/// White blood cell count, cells/µL (LOINC).
pub const WBC: &str = "53286-1";
/// Body temperature during fever, °C (SNOMED CT).
pub const FEVER: &str = "386661006";
pub const CHILLS: &str = "43724002";
pub const ALLERGIC_STATE: &str = "243865006";
pub const SKIN_LOOK: &str = "185823004";

/// Every symptom that feeds systemic toxicity.
pub const SYMPTOMS: [&str; 4] = [FEVER, CHILLS, SKIN_LOOK, ALLERGIC_STATE];
