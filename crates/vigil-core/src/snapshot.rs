//! Feature snapshots: the most recent clinically valid reading of every test
//! for a patient at a given instant, and the classifier seam that turns a
//! snapshot into derived states.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
  directory::Gender,
  log::ObservationLog,
  observation::{Observation, PatientId, TestCode, Value},
  window::WindowRegistry,
};

// ─── Derived states ──────────────────────────────────────────────────────────

/// A named axis of derived state, e.g. "Hemoglobin State".
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StateDimension(String);

impl StateDimension {
  pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for StateDimension {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// One categorical value of a dimension, e.g. "Mild_Anemia".
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StateValue(String);

impl StateValue {
  pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for StateValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// The classifier could not produce a value because required inputs were
/// absent from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("cannot determine {dimension}: missing {}", .missing_inputs.join(", "))]
pub struct ClassificationError {
  pub dimension:      StateDimension,
  pub missing_inputs: Vec<String>,
}

impl ClassificationError {
  pub fn missing(dimension: StateDimension, inputs: &[&str]) -> Self {
    Self {
      dimension,
      missing_inputs: inputs.iter().map(|s| (*s).to_owned()).collect(),
    }
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Everything a classifier may look at for one patient at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
  pub patient_id: PatientId,
  pub gender:     Option<Gender>,
  pub at:         DateTime<Utc>,
  /// The most clinically recent valid reading per test.
  pub readings:   BTreeMap<TestCode, Observation>,
}

impl FeatureSnapshot {
  pub fn value(&self, code: &str) -> Option<&Value> {
    self.readings.get(&TestCode::from(code)).map(|o| &o.value)
  }

  pub fn is_empty(&self) -> bool { self.readings.is_empty() }
}

/// Pure mapping from a snapshot to a derived state.
///
/// Implementations must not depend on anything but their arguments.
pub trait Classifier: Send + Sync {
  /// The dimensions this classifier can evaluate.
  fn dimensions(&self) -> Vec<StateDimension>;

  fn classify(
    &self,
    snapshot: &FeatureSnapshot,
    dimension: &StateDimension,
  ) -> Result<StateValue, ClassificationError>;
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The most clinically recent reading per test whose validity window covers
/// `instant`.
///
/// Retracted observations and observations of unregistered tests are
/// ignored. With `use_pov`, observations recorded after `instant` are ignored
/// as well. Within a test the greatest `valid_time` wins regardless of
/// transaction order; versions of the same fact are decided by the greatest
/// transaction time, then insertion order.
pub fn valid_tests_at<'a>(
  log: &'a ObservationLog,
  registry: &WindowRegistry,
  patient: &PatientId,
  instant: DateTime<Utc>,
  use_pov: bool,
) -> BTreeMap<TestCode, &'a Observation> {
  let mut latest: BTreeMap<TestCode, &'a Observation> = BTreeMap::new();

  for o in log.scan_patient(patient, |o| !o.retracted) {
    let window = match registry.lookup(&o.test_code) {
      Ok(w) => w,
      Err(_) => {
        debug!(test = %o.test_code, id = %o.observation_id, "unregistered test, skipped");
        continue;
      }
    };
    if !window.covers(o.valid_time, instant) {
      continue;
    }
    if use_pov && o.transaction_time > instant {
      continue;
    }

    let key = |o: &Observation| (o.valid_time, o.transaction_time, o.observation_id);
    latest
      .entry(o.test_code.clone())
      .and_modify(|held| {
        if key(o) > key(*held) {
          *held = o;
        }
      })
      .or_insert(o);
  }

  debug!(patient = %patient, %instant, use_pov, tests = latest.len(), "valid tests");
  latest
}

/// Build the feature snapshot for `patient` at `instant`.
pub fn snapshot(
  log: &ObservationLog,
  registry: &WindowRegistry,
  patient: &PatientId,
  gender: Option<Gender>,
  instant: DateTime<Utc>,
  use_pov: bool,
) -> FeatureSnapshot {
  let readings = valid_tests_at(log, registry, patient, instant, use_pov)
    .into_iter()
    .map(|(code, o)| (code, o.clone()))
    .collect();

  FeatureSnapshot {
    patient_id: patient.clone(),
    gender,
    at: instant,
    readings,
  }
}
