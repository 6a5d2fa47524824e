//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Observation values are compact JSON.
//! Window durations are whole seconds.

use chrono::{DateTime, TimeDelta, Utc};
use vigil_core::{
  directory::{Gender, Patient, TestDefinition},
  observation::{Observation, ObservationId, PatientId, TestCode, Value},
  window::ValidityWindow,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Sequence numbers ────────────────────────────────────────────────────────

pub fn encode_seq(id: ObservationId) -> Result<i64> {
  i64::try_from(id.0).map_err(|_| Error::Decode(format!("sequence {id} out of range")))
}

pub fn decode_seq(seq: i64) -> Result<ObservationId> {
  u64::try_from(seq)
    .map(ObservationId)
    .map_err(|_| Error::Decode(format!("negative sequence {seq}")))
}

// ─── Value ───────────────────────────────────────────────────────────────────

pub fn encode_value(v: &Value) -> Result<String> {
  v.check_finite()?;
  Ok(serde_json::to_string(v)?)
}

pub fn decode_value(s: &str) -> Result<Value> { Ok(serde_json::from_str(s)?) }

// ─── Window ──────────────────────────────────────────────────────────────────

/// Windows are whole seconds by construction.
pub fn encode_window(w: ValidityWindow) -> (i64, i64) {
  (w.good_before().num_seconds(), w.good_after().num_seconds())
}

pub fn decode_window(before: i64, after: i64) -> Result<ValidityWindow> {
  let secs = |n: i64| {
    TimeDelta::try_seconds(n).ok_or_else(|| Error::Decode(format!("duration out of range: {n}s")))
  };
  Ok(ValidityWindow::new(secs(before)?, secs(after)?)?)
}

// ─── Gender ──────────────────────────────────────────────────────────────────

pub fn encode_gender(g: Option<Gender>) -> Option<&'static str> {
  g.map(|g| match g {
    Gender::Male => "Male",
    Gender::Female => "Female",
  })
}

pub fn decode_gender(s: Option<&str>) -> Result<Option<Gender>> {
  s.map(|s| {
    s.parse::<Gender>()
      .map_err(|_| Error::Decode(format!("unknown gender: {s:?}")))
  })
  .transpose()
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `observations` row.
pub struct RawObservation {
  pub seq:              i64,
  pub patient_id:       String,
  pub test_code:        String,
  pub value_json:       String,
  pub valid_time:       String,
  pub transaction_time: String,
  pub retracted:        bool,
}

impl RawObservation {
  pub fn into_observation(self) -> Result<Observation> {
    Ok(Observation {
      observation_id:   decode_seq(self.seq)?,
      patient_id:       PatientId::new(self.patient_id),
      test_code:        TestCode::new(self.test_code),
      value:            decode_value(&self.value_json)?,
      valid_time:       decode_dt(&self.valid_time)?,
      transaction_time: decode_dt(&self.transaction_time)?,
      retracted:        self.retracted,
    })
  }
}

/// Raw values read directly from a `patients` row.
pub struct RawPatient {
  pub patient_id: String,
  pub first_name: String,
  pub last_name:  String,
  pub gender:     Option<String>,
  pub age:        Option<i64>,
}

impl RawPatient {
  pub fn into_patient(self) -> Result<Patient> {
    let age = self
      .age
      .map(|a| u32::try_from(a).map_err(|_| Error::Decode(format!("age out of range: {a}"))))
      .transpose()?;

    Ok(Patient {
      patient_id: PatientId::new(self.patient_id),
      first_name: self.first_name,
      last_name: self.last_name,
      gender: decode_gender(self.gender.as_deref())?,
      age,
    })
  }
}

/// Raw values read directly from a `tests` row.
pub struct RawTest {
  pub code:             String,
  pub name:             String,
  pub units:            Option<String>,
  pub good_before_secs: i64,
  pub good_after_secs:  i64,
}

impl RawTest {
  pub fn into_test(self) -> Result<(TestDefinition, ValidityWindow)> {
    let window = decode_window(self.good_before_secs, self.good_after_secs)?;
    let test = TestDefinition {
      code:  TestCode::new(self.code),
      name:  self.name,
      units: self.units,
    };
    Ok((test, window))
  }
}
