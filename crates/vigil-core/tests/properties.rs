//! Property tests for the ledger's bitemporal guarantees.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use vigil_core::{
  Ledger, LedgerState,
  clock::FixedClock,
  directory::{Gender, Patient, TestDefinition},
  observation::{NewObservation, Observation, PatientId, TestCode, Value},
  query::ValidTarget,
  snapshot::{ClassificationError, Classifier, FeatureSnapshot, StateDimension, StateValue},
  window::ValidityWindow,
};

struct Nothing;

impl Classifier for Nothing {
  fn dimensions(&self) -> Vec<StateDimension> { Vec::new() }

  fn classify(
    &self,
    _snapshot: &FeatureSnapshot,
    dimension: &StateDimension,
  ) -> Result<StateValue, ClassificationError> {
    Err(ClassificationError::missing(dimension.clone(), &[]))
  }
}

#[derive(Debug, Clone)]
enum Op {
  Record(u32, f64),
  Update(u32, f64),
  Delete(u32),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    (0u32..4, 0.0f64..20.0).prop_map(|(slot, v)| Op::Record(slot, v)),
    (0u32..4, 0.0f64..20.0).prop_map(|(slot, v)| Op::Update(slot, v)),
    (0u32..4).prop_map(Op::Delete),
  ]
}

fn base() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 8, 5, 0, 0, 0).unwrap() }

fn valid(slot: u32) -> DateTime<Utc> { base() + TimeDelta::hours(i64::from(slot)) }

fn ledger() -> Ledger {
  let ledger = Ledger::new(LedgerState::default(), Arc::new(Nothing))
    .with_clock(Arc::new(FixedClock(base() + TimeDelta::days(30))));
  ledger
    .add_patient(Patient {
      patient_id: PatientId::from("P1"),
      first_name: "James".into(),
      last_name:  "Smith".into(),
      gender:     Some(Gender::Male),
      age:        None,
    })
    .unwrap();
  ledger
    .add_test(
      TestDefinition { code: TestCode::from("718-7"), name: "Hemoglobin".into(), units: None },
      ValidityWindow::new(TimeDelta::zero(), TimeDelta::hours(24)).unwrap(),
    )
    .unwrap();
  ledger
}

/// Apply one operation recorded at `at`. Failures (nothing to update or
/// delete) are part of the exercise and are ignored.
fn apply(ledger: &Ledger, op: &Op, at: DateTime<Utc>) {
  let _ = match *op {
    Op::Record(slot, v) => ledger
      .record(NewObservation::new("P1", "718-7", v, valid(slot)).recorded_at(at))
      .map(|_| ()),
    Op::Update(slot, v) => ledger
      .update("P1", "718-7", valid(slot), Value::Number(v), at)
      .map(|_| ()),
    Op::Delete(slot) => ledger.delete("P1", "718-7", valid(slot)).map(|_| ()),
  };
}

fn history(ledger: &Ledger) -> Vec<Observation> {
  let latest = ValidTarget::Day((base() + TimeDelta::days(30)).date_naive());
  ledger.history("P1", "718-7", None, latest).unwrap()
}

proptest! {
  #[test]
  fn prop_history_is_append_only(ops in prop::collection::vec(op(), 1..40)) {
    let l = ledger();
    let mut seen: Vec<Observation> = Vec::new();

    for (i, op) in ops.iter().enumerate() {
      apply(&l, op, base() + TimeDelta::minutes(i as i64 + 1));
      let rows = history(&l);
      prop_assert!(rows.len() >= seen.len());
      for pair in rows.windows(2) {
        prop_assert!(
          pair[0].transaction_time >= pair[1].transaction_time,
          "history not newest first"
        );
      }

      for old in &seen {
        let now = rows.iter().find(|r| r.observation_id == old.observation_id);
        prop_assert!(now.is_some(), "{} disappeared", old.observation_id);
        let now = now.unwrap();
        prop_assert_eq!(&now.value, &old.value);
        prop_assert_eq!(now.transaction_time, old.transaction_time);
        prop_assert!(now.retracted || !old.retracted, "retraction was undone");
      }
      seen = rows;
    }
  }

  #[test]
  fn prop_at_most_one_visible_version(
    ops in prop::collection::vec(op(), 1..40),
    pov_minutes in 0i64..60,
    slot in 0u32..4,
  ) {
    let l = ledger();
    for (i, op) in ops.iter().enumerate() {
      apply(&l, op, base() + TimeDelta::minutes(i as i64 + 1));
    }

    let pov = base() + TimeDelta::minutes(pov_minutes);
    let hit = l
      .value_at("P1", "718-7", ValidTarget::Instant(valid(slot)), Some(pov))
      .unwrap();

    let expected = history(&l)
      .into_iter()
      .filter(|o| o.valid_time == valid(slot) && !o.retracted && o.transaction_time <= pov)
      .max_by_key(|o| (o.transaction_time, o.observation_id));

    prop_assert_eq!(hit.map(|o| o.observation_id), expected.map(|o| o.observation_id));
  }
}
