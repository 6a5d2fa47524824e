//! [`RuleTable`]: the reference clinical classifier.

use strum::IntoEnumIterator;
use tracing::trace;
use vigil_core::{
  directory::Gender,
  observation::Value,
  snapshot::{ClassificationError, Classifier, FeatureSnapshot, StateDimension, StateValue},
};

use crate::{
  codes,
  states::{Dimension, Grade, HematologicalState, HemoglobinState, Treatment, state_value},
};

/// Stateless: every result is a function of the snapshot alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleTable;

impl RuleTable {
  pub fn new() -> Self { Self }

  pub fn hemoglobin_state(
    &self,
    snapshot: &FeatureSnapshot,
  ) -> Result<HemoglobinState, ClassificationError> {
    let hb = numeric(snapshot, codes::HEMOGLOBIN);
    match (snapshot.gender, hb) {
      (Some(gender), Some(hb)) => Ok(HemoglobinState::from_level(gender, hb)),
      _ => Err(missing(
        Dimension::HemoglobinState,
        snapshot.gender,
        &[(codes::HEMOGLOBIN, hb.is_some())],
      )),
    }
  }

  pub fn hematological_state(
    &self,
    snapshot: &FeatureSnapshot,
  ) -> Result<HematologicalState, ClassificationError> {
    let hb = numeric(snapshot, codes::HEMOGLOBIN);
    let wbc = numeric(snapshot, codes::WBC);
    match (snapshot.gender, hb, wbc) {
      (Some(gender), Some(hb), Some(wbc)) => {
        Ok(HematologicalState::from_levels(gender, hb, wbc))
      }
      _ => Err(missing(
        Dimension::HematologicalState,
        snapshot.gender,
        &[(codes::HEMOGLOBIN, hb.is_some()), (codes::WBC, wbc.is_some())],
      )),
    }
  }

  /// The most severe grade over every symptom present in the snapshot.
  pub fn systemic_toxicity(
    &self,
    snapshot: &FeatureSnapshot,
  ) -> Result<Grade, ClassificationError> {
    let grades = [
      numeric(snapshot, codes::FEVER).map(Grade::of_fever),
      text(snapshot, codes::CHILLS).map(Grade::of_chills),
      text(snapshot, codes::SKIN_LOOK).map(Grade::of_skin_look),
      text(snapshot, codes::ALLERGIC_STATE).map(Grade::of_allergic_state),
    ];

    grades.into_iter().flatten().max().ok_or_else(|| {
      ClassificationError::missing(Dimension::SystemicToxicity.into(), &codes::SYMPTOMS)
    })
  }

  /// Requires gender and all three other dimensions; the combination must
  /// appear in the treatment table.
  pub fn treatment(&self, snapshot: &FeatureSnapshot) -> Result<Treatment, ClassificationError> {
    let hb = self.hemoglobin_state(snapshot);
    let hem = self.hematological_state(snapshot);
    let tox = self.systemic_toxicity(snapshot);

    let (Some(gender), Ok(hb), Ok(hem), Ok(tox)) = (snapshot.gender, &hb, &hem, &tox) else {
      let mut absent = Vec::new();
      if snapshot.gender.is_none() {
        absent.push("gender");
      }
      for (dimension, ok) in [
        (Dimension::HemoglobinState, hb.is_ok()),
        (Dimension::HematologicalState, hem.is_ok()),
        (Dimension::SystemicToxicity, tox.is_ok()),
      ] {
        if !ok {
          absent.push(<&'static str>::from(dimension));
        }
      }
      return Err(ClassificationError::missing(Dimension::Treatment.into(), &absent));
    };

    Treatment::select(gender, *hb, *hem, *tox).ok_or_else(|| ClassificationError {
      dimension:      Dimension::Treatment.into(),
      missing_inputs: vec![format!("a {gender} rule for {hb}, {hem}, {tox}")],
    })
  }
}

impl Classifier for RuleTable {
  fn dimensions(&self) -> Vec<StateDimension> { Dimension::iter().map(Into::into).collect() }

  fn classify(
    &self,
    snapshot: &FeatureSnapshot,
    dimension: &StateDimension,
  ) -> Result<StateValue, ClassificationError> {
    let Ok(known) = dimension.as_str().parse::<Dimension>() else {
      return Err(ClassificationError::missing(dimension.clone(), &["a rule for this dimension"]));
    };

    let result = match known {
      Dimension::HemoglobinState => self.hemoglobin_state(snapshot).map(state_value),
      Dimension::HematologicalState => self.hematological_state(snapshot).map(state_value),
      Dimension::SystemicToxicity => self.systemic_toxicity(snapshot).map(state_value),
      Dimension::Treatment => self.treatment(snapshot).map(state_value),
    };
    trace!(patient = %snapshot.patient_id, at = %snapshot.at, %dimension, ?result, "classified");
    result
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Non-numeric readings count as absent.
fn numeric(snapshot: &FeatureSnapshot, code: &str) -> Option<f64> {
  snapshot.value(code).and_then(Value::as_f64)
}

/// Numeric readings of a categorical input count as absent.
fn text<'a>(snapshot: &'a FeatureSnapshot, code: &str) -> Option<&'a str> {
  snapshot.value(code).and_then(Value::as_text)
}

fn missing(
  dimension: Dimension,
  gender: Option<Gender>,
  inputs: &[(&str, bool)],
) -> ClassificationError {
  let mut absent: Vec<&str> = Vec::new();
  if gender.is_none() {
    absent.push("gender");
  }
  absent.extend(inputs.iter().filter(|(_, present)| !present).map(|(code, _)| *code));
  ClassificationError::missing(dimension.into(), &absent)
}
