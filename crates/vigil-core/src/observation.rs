//! Observations: the versioned facts held by the observation log.
//!
//! An observation records one value of one test for one patient, together
//! with two instants: the clinical instant the value pertains to
//! (`valid_time`) and the instant this version entered the store
//! (`transaction_time`). Corrections never touch an existing observation;
//! they append a new version sharing the same `(patient, test, valid_time)`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Opaque patient identifier.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PatientId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for PatientId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

/// Opaque test code (a LOINC number, SNOMED concept id, ...).
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TestCode(String);

impl TestCode {
  pub fn new(code: impl Into<String>) -> Self { Self(code.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TestCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for TestCode {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

/// Insertion sequence number of a stored observation.
///
/// Strictly increasing in append order; used to break ties between versions
/// sharing a transaction time (the later insertion wins).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ObservationId(pub u64);

impl fmt::Display for ObservationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// The untyped scalar carried by an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Number(f64),
  Text(String),
}

impl Value {
  /// Numeric reading of the value. Text that parses as a number counts.
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Number(n) => Some(*n),
      Self::Text(s) => s.trim().parse().ok(),
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Number(_) => None,
      Self::Text(s) => Some(s),
    }
  }

  /// NaN and the infinities have no stored form and are refused.
  pub fn check_finite(&self) -> Result<()> {
    match self {
      Self::Number(n) if !n.is_finite() => Err(Error::InvalidValue(n.to_string())),
      _ => Ok(()),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Number(n) => write!(f, "{n}"),
      Self::Text(s) => f.write_str(s),
    }
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

// ─── Observation ─────────────────────────────────────────────────────────────

/// One stored version of a measurement.
///
/// Only `retracted` ever changes after the observation is appended, and only
/// from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
  pub observation_id:   ObservationId,
  pub patient_id:       PatientId,
  pub test_code:        TestCode,
  pub value:            Value,
  /// The clinical instant this measurement pertains to.
  pub valid_time:       DateTime<Utc>,
  /// The instant this version was recorded.
  pub transaction_time: DateTime<Utc>,
  pub retracted:        bool,
}

impl Observation {
  /// Whether `other` is a version of the same logical fact.
  pub fn same_fact(&self, other: &Observation) -> bool {
    self.patient_id == other.patient_id
      && self.test_code == other.test_code
      && self.valid_time == other.valid_time
  }

  /// Ordering key for version chains: transaction time, then insertion order.
  pub(crate) fn version_key(&self) -> (DateTime<Utc>, ObservationId) {
    (self.transaction_time, self.observation_id)
  }
}

// ─── NewObservation ──────────────────────────────────────────────────────────

/// Input to [`crate::ledger::Ledger::record`].
///
/// `patient` and `test` may be names or identifiers; they are resolved by the
/// ledger. When `transaction_time` is `None` the ledger's clock supplies it.
#[derive(Debug, Clone)]
pub struct NewObservation {
  pub patient:          String,
  pub test:             String,
  pub value:            Value,
  pub valid_time:       DateTime<Utc>,
  pub transaction_time: Option<DateTime<Utc>>,
}

impl NewObservation {
  pub fn new(
    patient: impl Into<String>,
    test: impl Into<String>,
    value: impl Into<Value>,
    valid_time: DateTime<Utc>,
  ) -> Self {
    Self {
      patient: patient.into(),
      test: test.into(),
      value: value.into(),
      valid_time,
      transaction_time: None,
    }
  }

  pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
    self.transaction_time = Some(at);
    self
  }
}
