//! The append-only observation log.
//!
//! Observations are never removed. The only in-place change is flipping
//! `retracted` from `false` to `true`.

use std::collections::HashMap;

use crate::{
  Error, Result,
  observation::{Observation, ObservationId, PatientId},
};

#[derive(Debug, Clone, Default)]
pub struct ObservationLog {
  records:    Vec<Observation>,
  by_id:      HashMap<ObservationId, usize>,
  by_patient: HashMap<PatientId, Vec<usize>>,
  next_id:    u64,
}

impl ObservationLog {
  pub fn new() -> Self { Self::default() }

  /// Rebuild a log from previously persisted records, in insertion order.
  pub fn from_records(records: impl IntoIterator<Item = Observation>) -> Self {
    let mut log = Self::new();
    for record in records {
      log.append(record);
    }
    log
  }

  /// The identifier the next appended observation should carry.
  pub fn next_id(&self) -> ObservationId { ObservationId(self.next_id) }

  /// Store a new version verbatim.
  ///
  /// Callers allocate `observation_id` with [`Self::next_id`]; identifiers
  /// must be strictly increasing.
  pub fn append(&mut self, observation: Observation) -> &Observation {
    debug_assert!(
      observation.observation_id.0 >= self.next_id,
      "observation ids must be strictly increasing"
    );
    let index = self.records.len();
    self.next_id = self.next_id.max(observation.observation_id.0 + 1);
    self.by_id.insert(observation.observation_id, index);
    self
      .by_patient
      .entry(observation.patient_id.clone())
      .or_default()
      .push(index);
    self.records.push(observation);
    &self.records[index]
  }

  /// Mark a stored observation as retracted. This is not a new version.
  pub fn retract(&mut self, id: ObservationId) -> Result<&Observation> {
    let index = *self.by_id.get(&id).ok_or(Error::NotFound(id))?;
    let record = &mut self.records[index];
    record.retracted = true;
    Ok(record)
  }

  pub fn get(&self, id: ObservationId) -> Option<&Observation> {
    self.by_id.get(&id).map(|&i| &self.records[i])
  }

  /// Lazily yield every observation matching `predicate`, in insertion order.
  ///
  /// Each call re-reads the current contents of the log.
  pub fn scan<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a Observation> + 'a
  where
    P: Fn(&Observation) -> bool + 'a,
  {
    self.records.iter().filter(move |o| predicate(o))
  }

  /// Like [`Self::scan`] but restricted to one patient's observations.
  pub fn scan_patient<'a, P>(
    &'a self,
    patient: &PatientId,
    predicate: P,
  ) -> impl Iterator<Item = &'a Observation> + use<'a, P>
  where
    P: Fn(&Observation) -> bool + 'a,
  {
    self
      .by_patient
      .get(patient)
      .map(Vec::as_slice)
      .unwrap_or_default()
      .iter()
      .map(|&i| &self.records[i])
      .filter(move |o| predicate(o))
  }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::observation::{TestCode, Value};

  fn obs(log: &ObservationLog, patient: &str, value: f64) -> Observation {
    let t = Utc.with_ymd_and_hms(2024, 8, 5, 9, 0, 0).unwrap();
    Observation {
      observation_id:   log.next_id(),
      patient_id:       PatientId::from(patient),
      test_code:        TestCode::from("718-7"),
      value:            Value::Number(value),
      valid_time:       t,
      transaction_time: t,
      retracted:        false,
    }
  }

  #[test]
  fn append_assigns_increasing_ids() {
    let mut log = ObservationLog::new();
    let first = obs(&log, "P1", 12.0);
    log.append(first);
    let second = obs(&log, "P1", 13.0);
    log.append(second);

    let ids: Vec<_> = log.scan(|_| true).map(|o| o.observation_id).collect();
    assert_eq!(ids, vec![ObservationId(0), ObservationId(1)]);
    assert_eq!(log.next_id(), ObservationId(2));
  }

  #[test]
  fn retract_flips_flag_in_place() {
    let mut log = ObservationLog::new();
    let o = obs(&log, "P1", 12.0);
    let id = o.observation_id;
    log.append(o);

    let retracted = log.retract(id).unwrap();
    assert!(retracted.retracted);
    assert_eq!(log.len(), 1);
    assert!(log.get(id).unwrap().retracted);
  }

  #[test]
  fn retract_unknown_id_is_not_found() {
    let mut log = ObservationLog::new();
    let err = log.retract(ObservationId(42)).unwrap_err();
    assert!(matches!(err, Error::NotFound(ObservationId(42))));
  }

  #[test]
  fn scan_reflects_later_appends() {
    let mut log = ObservationLog::new();
    let o = obs(&log, "P1", 12.0);
    log.append(o);
    assert_eq!(log.scan(|o| o.patient_id.as_str() == "P1").count(), 1);

    let o = obs(&log, "P1", 14.0);
    log.append(o);
    assert_eq!(log.scan(|o| o.patient_id.as_str() == "P1").count(), 2);
  }

  #[test]
  fn scan_patient_only_sees_that_patient() {
    let mut log = ObservationLog::new();
    for (p, v) in [("P1", 1.0), ("P2", 2.0), ("P1", 3.0)] {
      let o = obs(&log, p, v);
      log.append(o);
    }

    let values: Vec<_> = log
      .scan_patient(&PatientId::from("P1"), |_| true)
      .map(|o| o.value.as_f64().unwrap())
      .collect();
    assert_eq!(values, vec![1.0, 3.0]);
    assert_eq!(log.scan_patient(&PatientId::from("P9"), |_| true).count(), 0);
  }

  #[test]
  fn from_records_resumes_id_sequence() {
    let mut seed = ObservationLog::new();
    let o = obs(&seed, "P1", 1.0);
    seed.append(o);
    let records: Vec<_> = seed.scan(|_| true).cloned().collect();

    let log = ObservationLog::from_records(records);
    assert_eq!(log.next_id(), ObservationId(1));
  }
}
