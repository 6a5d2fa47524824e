//! End-to-end: SQLite persistence, the ledger and the rule table together.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use vigil_core::{
  Ledger,
  clock::FixedClock,
  directory::{Gender, Patient, TestDefinition},
  interval::Interval,
  observation::{NewObservation, PatientId, TestCode, Value},
  query::ValidTarget,
  snapshot::{StateDimension, StateValue},
  window::ValidityWindow,
};
use vigil_rules::{Dimension, RuleTable, codes};
use vigil_store_sqlite::SqliteStore;

fn t(d: u32, h: u32, m: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 8, d, h, m, 0).unwrap()
}

fn open(path: &std::path::Path) -> Ledger {
  let store = Arc::new(SqliteStore::open(path).unwrap());
  let state = store.load().unwrap();
  Ledger::new(state, Arc::new(RuleTable))
    .with_persistence(store)
    .with_clock(Arc::new(FixedClock(t(31, 0, 0))))
}

fn window(after_hours: i64) -> ValidityWindow {
  ValidityWindow::new(TimeDelta::zero(), TimeDelta::hours(after_hours)).unwrap()
}

fn seed(ledger: &Ledger) {
  for (id, first, last, gender) in [
    ("P1", "James", "Smith", Gender::Male),
    ("P2", "Mary", "Jones", Gender::Female),
  ] {
    ledger
      .add_patient(Patient {
        patient_id: PatientId::from(id),
        first_name: first.into(),
        last_name:  last.into(),
        gender:     Some(gender),
        age:        None,
      })
      .unwrap();
  }

  for (code, name, hours) in [
    (codes::HEMOGLOBIN, "Hemoglobin", 24),
    (codes::WBC, "WBC", 24),
    (codes::FEVER, "Fever", 12),
  ] {
    let test = TestDefinition { code: TestCode::from(code), name: name.into(), units: None };
    ledger.add_test(test, window(hours)).unwrap();
  }

  let morning = t(5, 9, 0);
  for (test, value) in [("Hemoglobin", 8.0), ("WBC", 3000.0), ("Fever", 37.0)] {
    ledger
      .record(NewObservation::new("James Smith", test, value, morning).recorded_at(t(5, 9, 10)))
      .unwrap();
  }
}

fn state(v: &str) -> StateValue { StateValue::new(v) }

fn dim(d: Dimension) -> StateDimension { d.into() }

#[test]
fn hemoglobin_reading_respects_point_of_view() {
  let dir = tempfile::tempdir().unwrap();
  let ledger = open(&dir.path().join("vigil.db"));
  seed(&ledger);

  let target = ValidTarget::Instant(t(5, 9, 0));
  assert!(ledger.value_at("P1", "718-7", target, Some(t(5, 9, 12))).unwrap().is_some());
  assert!(ledger.value_at("P1", "718-7", target, Some(t(5, 8, 59))).unwrap().is_none());
}

#[test]
fn states_and_treatment_from_stored_readings() {
  let dir = tempfile::tempdir().unwrap();
  let ledger = open(&dir.path().join("vigil.db"));
  seed(&ledger);

  let board = ledger.states_at(t(5, 10, 0), false).unwrap();
  let p1 = &board[&PatientId::from("P1")];
  assert_eq!(p1[&dim(Dimension::HemoglobinState)], Ok(state("Severe_Anemia")));
  assert_eq!(p1[&dim(Dimension::HematologicalState)], Ok(state("Pancytopenia")));
  assert_eq!(p1[&dim(Dimension::SystemicToxicity)], Ok(state("Grade_I")));
  assert_eq!(p1[&dim(Dimension::Treatment)], Ok(state("M_I")));

  let p2 = &board[&PatientId::from("P2")];
  assert!(p2.values().all(Result::is_err));
}

#[test]
fn correction_changes_state_only_for_later_points_of_view() {
  let dir = tempfile::tempdir().unwrap();
  let ledger = open(&dir.path().join("vigil.db"));
  seed(&ledger);

  ledger
    .update("P1", "Hemoglobin", t(5, 9, 0), Value::Number(14.0), t(6, 8, 0))
    .unwrap();

  let hb = dim(Dimension::HemoglobinState);
  assert_eq!(
    ledger.classify("P1", &hb, t(5, 10, 0), true).unwrap(),
    state("Severe_Anemia")
  );
  assert_eq!(
    ledger.classify("P1", &hb, t(5, 10, 0), false).unwrap(),
    state("Normal_Hemoglobin")
  );
}

#[test]
fn timelines_close_when_inputs_expire() {
  let dir = tempfile::tempdir().unwrap();
  let ledger = open(&dir.path().join("vigil.db"));
  seed(&ledger);

  let expected = vec![Interval { start: t(5, 9, 0), end: t(6, 9, 0) }];

  let toxicity = ledger
    .state_intervals("P1", &Dimension::SystemicToxicity.into())
    .unwrap();
  assert_eq!(toxicity[&state("Grade_I")], expected);

  let treatment = ledger.state_intervals("P1", &Dimension::Treatment.into()).unwrap();
  assert_eq!(treatment.len(), 1);
  assert_eq!(treatment[&state("M_I")], expected);

  let all = ledger.state_intervals_all(&Dimension::Treatment.into()).unwrap();
  assert!(all[&PatientId::from("P2")].is_empty());
}

#[test]
fn reopened_store_gives_the_same_answers() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("vigil.db");

  let before = {
    let ledger = open(&path);
    seed(&ledger);
    ledger.delete("P1", "Fever", t(5, 9, 0)).unwrap();
    ledger.patient_states_at("P1", t(5, 10, 0), false).unwrap()
  };
  assert!(before[&dim(Dimension::SystemicToxicity)].is_err());

  let ledger = open(&path);
  let after = ledger.patient_states_at("P1", t(5, 10, 0), false).unwrap();
  assert_eq!(after, before);
  assert_eq!(ledger.earliest_entry("P1").unwrap(), Some(t(5, 9, 0)));
}
