//! The categorical values of every dimension the rule table derives.
//!
//! Each enum renders (via strum) as the exact state name reported to
//! callers, e.g. `HemoglobinState::SevereAnemia` is `"Severe_Anemia"`.

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};
use vigil_core::{
  directory::Gender,
  snapshot::{StateDimension, StateValue},
};

/// Wrap any rule-table state as the core's untyped state value.
pub fn state_value(state: impl AsRef<str>) -> StateValue { StateValue::new(state.as_ref()) }

// ─── Dimensions ──────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr,
  IntoStaticStr,
)]
pub enum Dimension {
  #[strum(serialize = "Hemoglobin State")]
  HemoglobinState,
  #[strum(serialize = "Hematological State")]
  HematologicalState,
  #[strum(serialize = "Systemic Toxicity")]
  SystemicToxicity,
  #[strum(serialize = "Treatment")]
  Treatment,
}

impl From<Dimension> for StateDimension {
  fn from(d: Dimension) -> Self { StateDimension::new(d.as_ref()) }
}

// ─── Hemoglobin ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr)]
pub enum HemoglobinState {
  #[strum(serialize = "Severe_Anemia")]
  SevereAnemia,
  #[strum(serialize = "Moderate_Anemia")]
  ModerateAnemia,
  #[strum(serialize = "Mild_Anemia")]
  MildAnemia,
  #[strum(serialize = "Normal_Hemoglobin")]
  NormalHemoglobin,
  #[strum(serialize = "Polycythemia")]
  Polycythemia,
}

impl HemoglobinState {
  /// Band a hemoglobin level (g/dL); the thresholds depend on gender.
  pub fn from_level(gender: Gender, hemoglobin: f64) -> Self {
    let [severe, moderate, mild, normal] = match gender {
      Gender::Male => [9.0, 11.0, 13.0, 16.0],
      Gender::Female => [8.0, 10.0, 12.0, 14.0],
    };

    if hemoglobin < severe {
      Self::SevereAnemia
    } else if hemoglobin < moderate {
      Self::ModerateAnemia
    } else if hemoglobin < mild {
      Self::MildAnemia
    } else if hemoglobin < normal {
      Self::NormalHemoglobin
    } else {
      Self::Polycythemia
    }
  }
}

// ─── Hematological ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr)]
pub enum HematologicalState {
  #[strum(serialize = "Pancytopenia")]
  Pancytopenia,
  #[strum(serialize = "Anemia")]
  Anemia,
  #[strum(serialize = "Suspected_Leukemia")]
  SuspectedLeukemia,
  #[strum(serialize = "Leukopenia")]
  Leukopenia,
  #[strum(serialize = "Normal_Hematological")]
  NormalHematological,
  #[strum(serialize = "Leukemoid_Reaction")]
  LeukemoidReaction,
  #[strum(serialize = "Suspected_Polycythemia_Vera")]
  SuspectedPolycythemiaVera,
  #[strum(serialize = "Polyhemia")]
  Polyhemia,
}

impl HematologicalState {
  /// Rows are hemoglobin bands (low, normal, high), columns WBC bands
  /// (`< 4000`, `< 10000`, above).
  const TABLE: [[Self; 3]; 3] = [
    [Self::Pancytopenia, Self::Anemia, Self::SuspectedLeukemia],
    [Self::Leukopenia, Self::NormalHematological, Self::LeukemoidReaction],
    [Self::SuspectedPolycythemiaVera, Self::Polyhemia, Self::SuspectedPolycythemiaVera],
  ];

  pub fn from_levels(gender: Gender, hemoglobin: f64, wbc: f64) -> Self {
    let (low, high) = match gender {
      Gender::Male => (13.0, 16.0),
      Gender::Female => (12.0, 14.0),
    };
    let row = if hemoglobin < low {
      0
    } else if hemoglobin < high {
      1
    } else {
      2
    };
    let col = if wbc < 4000.0 {
      0
    } else if wbc < 10000.0 {
      1
    } else {
      2
    };
    Self::TABLE[row][col]
  }
}

// ─── Systemic toxicity ───────────────────────────────────────────────────────

/// Toxicity grade; the derived ordering is by severity.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum Grade {
  #[strum(serialize = "Grade_I")]
  I,
  #[strum(serialize = "Grade_II")]
  II,
  #[strum(serialize = "Grade_III")]
  III,
  #[strum(serialize = "Grade_IV")]
  IV,
}

impl Grade {
  /// Body temperature in °C.
  pub fn of_fever(celsius: f64) -> Self {
    if celsius >= 40.0 {
      Self::III
    } else if celsius >= 38.5 {
      Self::II
    } else {
      Self::I
    }
  }

  pub fn of_chills(description: &str) -> Self {
    match description {
      "Rigor" => Self::III,
      "Shaking" => Self::II,
      _ => Self::I,
    }
  }

  pub fn of_skin_look(description: &str) -> Self {
    match description {
      "Exfoliation" => Self::IV,
      "Desquamation" => Self::III,
      "Vesiculation" => Self::II,
      _ => Self::I,
    }
  }

  pub fn of_allergic_state(description: &str) -> Self {
    match description {
      "Anaphylactic Shock" => Self::IV,
      "Severe Bronchospasm" => Self::III,
      "Bronchospasm" => Self::II,
      _ => Self::I,
    }
  }
}

// ─── Treatment ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr)]
pub enum Treatment {
  #[strum(serialize = "M_I")]
  MaleI,
  #[strum(serialize = "M_II")]
  MaleII,
  #[strum(serialize = "M_III")]
  MaleIII,
  #[strum(serialize = "M_IV")]
  MaleIV,
  #[strum(serialize = "M_V")]
  MaleV,
  #[strum(serialize = "F_I")]
  FemaleI,
  #[strum(serialize = "F_II")]
  FemaleII,
  #[strum(serialize = "F_III")]
  FemaleIII,
  #[strum(serialize = "F_IV")]
  FemaleIV,
  #[strum(serialize = "F_V")]
  FemaleV,
}

impl Treatment {
  const MALE: [Self; 5] = [Self::MaleI, Self::MaleII, Self::MaleIII, Self::MaleIV, Self::MaleV];
  const FEMALE: [Self; 5] =
    [Self::FemaleI, Self::FemaleII, Self::FemaleIII, Self::FemaleIV, Self::FemaleV];

  /// Exact-match lookup. Combinations outside the table have no treatment.
  pub fn select(
    gender: Gender,
    hemoglobin: HemoglobinState,
    hematological: HematologicalState,
    toxicity: Grade,
  ) -> Option<Self> {
    use HematologicalState as Hem;
    use HemoglobinState as Hb;

    let rung = match (hemoglobin, hematological, toxicity) {
      (Hb::SevereAnemia, Hem::Pancytopenia, Grade::I) => 0,
      (Hb::ModerateAnemia, Hem::Anemia, Grade::II) => 1,
      (Hb::MildAnemia, Hem::SuspectedLeukemia, Grade::III) => 2,
      (Hb::NormalHemoglobin, Hem::LeukemoidReaction, Grade::IV) => 3,
      (Hb::Polycythemia, Hem::SuspectedPolycythemiaVera, Grade::IV) => 4,
      _ => return None,
    };
    Some(match gender {
      Gender::Male => Self::MALE[rung],
      Gender::Female => Self::FEMALE[rung],
    })
  }

  pub fn protocol(&self) -> &'static str {
    match self {
      Self::MaleI => "Measure BP once a week",
      Self::MaleII => "Measure BP every 3 days; give aspirin 5g twice a week",
      Self::MaleIII => "Measure BP every day; give aspirin 15g every day; diet consultation",
      Self::MaleIV => {
        "Measure BP twice a day; give aspirin 15g every day; exercise consultation; diet \
         consultation"
      }
      Self::MaleV => {
        "Measure BP every hour; give 1g magnesium every hour; exercise consultation; call \
         family"
      }
      Self::FemaleI => "Measure BP every 3 days",
      Self::FemaleII => {
        "Measure BP every 3 days; give Celectone 2g twice a day for two days (drug treatment)"
      }
      Self::FemaleIII => {
        "Measure BP every day; give 1g magnesium every 3 hours; diet consultation"
      }
      Self::FemaleIV => {
        "Measure BP twice a day; give 1g magnesium every hour; exercise consultation; diet \
         consultation"
      }
      Self::FemaleV => {
        "Measure BP every hour; give 1g magnesium every hour; exercise consultation; call help"
      }
    }
  }
}
