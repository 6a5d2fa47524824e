//! Integration tests for `SqliteStore`, in memory and on disk.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use vigil_core::{
  Ledger, LedgerState,
  directory::{Gender, Patient, TestDefinition},
  observation::{NewObservation, ObservationId, PatientId, TestCode, Value},
  persistence::{Mutation, Persistence},
  query::ValidTarget,
  snapshot::{ClassificationError, Classifier, FeatureSnapshot, StateDimension, StateValue},
  window::ValidityWindow,
};

use crate::SqliteStore;

struct NoRules;

impl Classifier for NoRules {
  fn dimensions(&self) -> Vec<StateDimension> { Vec::new() }

  fn classify(
    &self,
    _snapshot: &FeatureSnapshot,
    dimension: &StateDimension,
  ) -> Result<StateValue, ClassificationError> {
    Err(ClassificationError::missing(dimension.clone(), &[]))
  }
}

fn t(d: u32, h: u32, m: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 8, d, h, m, 0).unwrap()
}

fn patient() -> Patient {
  Patient {
    patient_id: PatientId::from("P1"),
    first_name: "James".into(),
    last_name:  "Smith".into(),
    gender:     Some(Gender::Male),
    age:        Some(54),
  }
}

fn hemoglobin() -> TestDefinition {
  TestDefinition {
    code:  TestCode::from("718-7"),
    name:  "Hemoglobin".into(),
    units: Some("g/dL".into()),
  }
}

fn one_day() -> ValidityWindow {
  ValidityWindow::new(TimeDelta::zero(), TimeDelta::hours(24)).unwrap()
}

fn ledger_over(store: Arc<SqliteStore>) -> Ledger {
  let state = store.load().unwrap();
  Ledger::new(state, Arc::new(NoRules)).with_persistence(store)
}

fn all_history(ledger: &Ledger) -> Vec<vigil_core::observation::Observation> {
  ledger
    .history("P1", "718-7", None, ValidTarget::Day(t(31, 0, 0).date_naive()))
    .unwrap()
}

// ─── Loading ─────────────────────────────────────────────────────────────────

#[test]
fn empty_store_loads_empty_state() {
  let store = SqliteStore::open_in_memory().unwrap();
  let state = store.load().unwrap();
  assert!(state.log.is_empty());
  assert!(state.registry.is_empty());
  assert_eq!(state.directory.patients().count(), 0);
}

#[test]
fn directory_and_windows_round_trip() {
  let store = SqliteStore::open_in_memory().unwrap();
  store.flush(&Mutation::AddPatient(&patient())).unwrap();
  store
    .flush(&Mutation::AddTest { test: &hemoglobin(), window: one_day() })
    .unwrap();

  let state = store.load().unwrap();
  let p = state.directory.patient(&PatientId::from("P1")).unwrap();
  assert_eq!(p, &patient());
  assert_eq!(state.directory.test(&TestCode::from("718-7")), Some(&hemoglobin()));
  assert_eq!(state.registry.lookup(&TestCode::from("718-7")).unwrap(), one_day());
}

#[test]
fn set_window_is_persisted() {
  let store = SqliteStore::open_in_memory().unwrap();
  store
    .flush(&Mutation::AddTest { test: &hemoglobin(), window: one_day() })
    .unwrap();

  let week = ValidityWindow::new(TimeDelta::hours(2), TimeDelta::days(7)).unwrap();
  let code = TestCode::from("718-7");
  store.flush(&Mutation::SetWindow { test: &code, window: week }).unwrap();

  assert_eq!(store.load().unwrap().registry.lookup(&code).unwrap(), week);
}

#[test]
fn unknown_targets_fail_to_flush() {
  let store = SqliteStore::open_in_memory().unwrap();
  assert!(store.flush(&Mutation::Retract(ObservationId(7))).is_err());

  let code = TestCode::from("718-7");
  assert!(store
    .flush(&Mutation::SetWindow { test: &code, window: one_day() })
    .is_err());
}

#[test]
fn duplicate_patient_fails_to_flush() {
  let store = SqliteStore::open_in_memory().unwrap();
  store.flush(&Mutation::AddPatient(&patient())).unwrap();
  assert!(store.flush(&Mutation::AddPatient(&patient())).is_err());
}

// ─── Through the ledger ──────────────────────────────────────────────────────

#[test]
fn ledger_mutations_survive_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("vigil.db");

  let before = {
    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let ledger = ledger_over(store);
    ledger.add_patient(patient()).unwrap();
    ledger.add_test(hemoglobin(), one_day()).unwrap();
    ledger
      .record(NewObservation::new("P1", "718-7", 12.0, t(5, 9, 0)).recorded_at(t(5, 9, 10)))
      .unwrap();
    ledger
      .record(NewObservation::new("P1", "718-7", "trace", t(6, 9, 0)).recorded_at(t(6, 9, 10)))
      .unwrap();
    ledger
      .update("P1", "718-7", t(5, 9, 0), Value::Number(13.5), t(5, 12, 0))
      .unwrap();
    ledger.delete("P1", "Hemoglobin", t(6, 9, 0)).unwrap();
    all_history(&ledger)
  };
  assert_eq!(before.len(), 3);

  let store = Arc::new(SqliteStore::open(&path).unwrap());
  let ledger = ledger_over(store);
  let after = all_history(&ledger);
  assert_eq!(after, before);
  assert!(after.iter().any(|o| o.retracted && o.value == Value::from("trace")));

  let next = ledger
    .record(NewObservation::new("P1", "718-7", 11.0, t(7, 9, 0)).recorded_at(t(7, 9, 10)))
    .unwrap();
  assert!(after.iter().all(|o| o.observation_id < next.observation_id));
}

#[test]
fn rejected_flush_leaves_memory_untouched() {
  let store = Arc::new(SqliteStore::open_in_memory().unwrap());

  // The directory knows the patient but the database does not, so the
  // foreign key on the insert fails.
  let mut state = LedgerState::default();
  state.directory.add_patient(patient()).unwrap();
  let ledger = Ledger::new(state, Arc::new(NoRules)).with_persistence(store.clone());
  ledger.add_test(hemoglobin(), one_day()).unwrap();

  let err = ledger
    .record(NewObservation::new("P1", "718-7", 12.0, t(5, 9, 0)).recorded_at(t(5, 9, 10)))
    .unwrap_err();
  assert!(matches!(err, vigil_core::Error::Storage(_)));
  assert!(all_history(&ledger).is_empty());
  assert!(store.load().unwrap().log.is_empty());
}

#[test]
fn non_finite_values_are_refused_before_reaching_disk() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("vigil.db");
  let store = Arc::new(SqliteStore::open(&path).unwrap());
  let ledger = ledger_over(store.clone());
  ledger.add_patient(patient()).unwrap();
  ledger.add_test(hemoglobin(), one_day()).unwrap();

  for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
    let err = ledger
      .record(NewObservation::new("P1", "718-7", bad, t(5, 9, 0)).recorded_at(t(5, 9, 10)))
      .unwrap_err();
    assert!(matches!(err, vigil_core::Error::InvalidValue(_)));
  }

  ledger
    .record(NewObservation::new("P1", "718-7", 12.0, t(5, 9, 0)).recorded_at(t(5, 9, 10)))
    .unwrap();
  let err = ledger
    .update("P1", "718-7", t(5, 9, 0), Value::Number(f64::NAN), t(5, 12, 0))
    .unwrap_err();
  assert!(matches!(err, vigil_core::Error::InvalidValue(_)));

  // A direct flush is refused by the encoder as well.
  let mut nan = all_history(&ledger).remove(0);
  nan.observation_id = ObservationId(99);
  nan.value = Value::Number(f64::NAN);
  assert!(store.flush(&Mutation::Append(&nan)).is_err());

  let reopened = SqliteStore::open(&path).unwrap().load().unwrap();
  assert_eq!(reopened.log.len(), 1);
}
