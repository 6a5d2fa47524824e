//! [`Ledger`]: the single entry point over the observation store.
//!
//! The ledger owns the log, the window registry and the directory behind one
//! reader/writer lock. Queries take the read side and see a consistent view
//! for their whole duration; mutations take the write side, flush through
//! [`Persistence`] and only then become visible.

use std::{
  collections::BTreeMap,
  sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
  Error, Result,
  clock::{Clock, SystemClock},
  directory::{Directory, IdentityResolver, Patient, TestDefinition},
  interval::{self, Interval, StateTimeline},
  log::ObservationLog,
  observation::{NewObservation, Observation, PatientId, TestCode, Value},
  persistence::{Mutation, NoopPersistence, Persistence},
  query::{self, ValidTarget},
  snapshot::{self, ClassificationError, Classifier, FeatureSnapshot, StateDimension, StateValue},
  window::{ValidityWindow, WindowRegistry},
};

/// Everything the ledger holds; also the shape loaded from persistence.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
  pub log:       ObservationLog,
  pub registry:  WindowRegistry,
  pub directory: Directory,
}

/// Derived state per dimension for one patient.
pub type PatientStates = BTreeMap<StateDimension, Result<StateValue, ClassificationError>>;

pub struct Ledger {
  state:       RwLock<LedgerState>,
  classifier:  Arc<dyn Classifier>,
  persistence: Arc<dyn Persistence>,
  clock:       Arc<dyn Clock>,
}

impl Ledger {
  /// An in-memory ledger on the system clock.
  pub fn new(state: LedgerState, classifier: Arc<dyn Classifier>) -> Self {
    Self {
      state: RwLock::new(state),
      classifier,
      persistence: Arc::new(NoopPersistence),
      clock: Arc::new(SystemClock),
    }
  }

  pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
    self.persistence = persistence;
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>> {
    self.state.read().map_err(|e| Error::LockPoisoned(e.to_string()))
  }

  fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>> {
    self.state.write().map_err(|e| Error::LockPoisoned(e.to_string()))
  }

  // ── Directory and registry ────────────────────────────────────────────

  pub fn add_patient(&self, patient: Patient) -> Result<()> {
    let mut state = self.write()?;
    if state.directory.patient(&patient.patient_id).is_some() {
      return Err(Error::Duplicate(format!("patient {}", patient.patient_id)));
    }

    self.persistence.flush(&Mutation::AddPatient(&patient))?;
    info!(patient = %patient.patient_id, "patient added");
    state.directory.add_patient(patient)
  }

  /// Register a test together with its validity window.
  pub fn add_test(&self, test: TestDefinition, window: ValidityWindow) -> Result<()> {
    let mut state = self.write()?;
    if state.directory.test(&test.code).is_some() || state.registry.contains(&test.code) {
      return Err(Error::Duplicate(format!("test {}", test.code)));
    }

    self.persistence.flush(&Mutation::AddTest { test: &test, window })?;
    info!(test = %test.code, name = %test.name, "test added");
    state.registry.register(test.code.clone(), window)?;
    state.directory.add_test(test)
  }

  /// Replace the validity window of a registered test.
  pub fn set_window(&self, test: &str, window: ValidityWindow) -> Result<()> {
    let mut state = self.write()?;
    let code = state.directory.resolve_test(test)?;
    state.registry.lookup(&code)?;

    self.persistence.flush(&Mutation::SetWindow { test: &code, window })?;
    info!(test = %code, ?window, "validity window changed");
    state.registry.update(&code, window)
  }

  pub fn window(&self, test: &str) -> Result<ValidityWindow> {
    let state = self.read()?;
    let code = state.directory.resolve_test(test)?;
    state.registry.lookup(&code)
  }

  pub fn patients(&self) -> Result<Vec<Patient>> {
    Ok(self.read()?.directory.patients().cloned().collect())
  }

  pub fn tests(&self) -> Result<Vec<(TestDefinition, Option<ValidityWindow>)>> {
    let state = self.read()?;
    Ok(
      state
        .directory
        .tests()
        .map(|t| (t.clone(), state.registry.lookup(&t.code).ok()))
        .collect(),
    )
  }

  // ── Writes ────────────────────────────────────────────────────────────

  /// Append a new measurement.
  pub fn record(&self, input: NewObservation) -> Result<Observation> {
    let mut state = self.write()?;
    let (patient_id, test_code) = resolve(&state.directory, &input.patient, &input.test)?;
    state.registry.lookup(&test_code)?;
    input.value.check_finite()?;

    let observation = Observation {
      observation_id: state.log.next_id(),
      patient_id,
      test_code,
      value: input.value,
      valid_time: input.valid_time,
      transaction_time: input.transaction_time.unwrap_or_else(|| self.clock.now()),
      retracted: false,
    };

    self.persistence.flush(&Mutation::Append(&observation))?;
    info!(
      id = %observation.observation_id,
      patient = %observation.patient_id,
      test = %observation.test_code,
      valid_time = %observation.valid_time,
      "measurement recorded"
    );
    Ok(state.log.append(observation).clone())
  }

  /// Append a corrected version of the measurement at exactly `valid_time`,
  /// recorded at `at`. The version corrected is the one visible now.
  pub fn update(
    &self,
    patient: &str,
    test: &str,
    valid_time: DateTime<Utc>,
    value: Value,
    at: DateTime<Utc>,
  ) -> Result<Observation> {
    let mut state = self.write()?;
    let (patient_id, test_code) = resolve(&state.directory, patient, test)?;
    value.check_finite()?;
    let now = self.clock.now();

    let current = query::locate_current(&state.log, &patient_id, &test_code, valid_time, now)
      .ok_or_else(|| no_measurement(&patient_id, &test_code, valid_time))?;
    let supersedes = current.observation_id;
    let revised = query::corrected_version(current, state.log.next_id(), value, at);

    self.persistence.flush(&Mutation::Append(&revised))?;
    info!(
      id = %revised.observation_id,
      %supersedes,
      transaction_time = %revised.transaction_time,
      "measurement updated"
    );
    Ok(state.log.append(revised).clone())
  }

  /// Retract the measurement at exactly `valid_time` visible now.
  ///
  /// The flag is flipped in place on that one version; no tombstone is
  /// appended, and earlier versions of the same fact are left untouched.
  pub fn delete(
    &self,
    patient: &str,
    test: &str,
    valid_time: DateTime<Utc>,
  ) -> Result<Observation> {
    let mut state = self.write()?;
    let (patient_id, test_code) = resolve(&state.directory, patient, test)?;
    let now = self.clock.now();

    let id = query::locate_current(&state.log, &patient_id, &test_code, valid_time, now)
      .map(|o| o.observation_id)
      .ok_or_else(|| no_measurement(&patient_id, &test_code, valid_time))?;

    self.persistence.flush(&Mutation::Retract(id))?;
    info!(%id, patient = %patient_id, test = %test_code, "measurement retracted");
    Ok(state.log.retract(id)?.clone())
  }

  // ── Temporal queries ──────────────────────────────────────────────────

  /// The version of the measurement visible as of `pov`.
  pub fn value_at(
    &self,
    patient: &str,
    test: &str,
    target: ValidTarget,
    pov: Option<DateTime<Utc>>,
  ) -> Result<Option<Observation>> {
    let state = self.read()?;
    let (patient_id, test_code) = resolve(&state.directory, patient, test)?;
    let hit = query::point_in_time(&state.log, &patient_id, &test_code, target, pov);
    debug!(
      patient = %patient_id,
      test = %test_code,
      ?target,
      ?pov,
      found = hit.is_some(),
      "point-in-time query"
    );
    Ok(hit.cloned())
  }

  /// Every recorded version in the valid-time range, retracted included.
  pub fn history(
    &self,
    patient: &str,
    test: &str,
    earliest: Option<ValidTarget>,
    latest: ValidTarget,
  ) -> Result<Vec<Observation>> {
    let state = self.read()?;
    let (patient_id, test_code) = resolve(&state.directory, patient, test)?;
    let rows = query::historic(&state.log, &patient_id, &test_code, earliest, latest);
    debug!(patient = %patient_id, test = %test_code, rows = rows.len(), "historic query");
    Ok(rows.into_iter().cloned().collect())
  }

  // ── Snapshots and states ──────────────────────────────────────────────

  pub fn valid_tests_at(
    &self,
    patient: &str,
    instant: DateTime<Utc>,
    use_pov: bool,
  ) -> Result<BTreeMap<TestCode, Observation>> {
    let state = self.read()?;
    let patient_id = state.directory.resolve_patient(patient)?;
    Ok(
      snapshot::valid_tests_at(&state.log, &state.registry, &patient_id, instant, use_pov)
        .into_iter()
        .map(|(code, o)| (code, o.clone()))
        .collect(),
    )
  }

  pub fn snapshot(
    &self,
    patient: &str,
    instant: DateTime<Utc>,
    use_pov: bool,
  ) -> Result<FeatureSnapshot> {
    let state = self.read()?;
    let patient = lookup_patient(&state.directory, patient)?;
    Ok(snapshot_of(&state, patient, instant, use_pov))
  }

  /// Classify one dimension; a classification failure is returned as
  /// [`Error::Classification`].
  pub fn classify(
    &self,
    patient: &str,
    dimension: &StateDimension,
    instant: DateTime<Utc>,
    use_pov: bool,
  ) -> Result<StateValue> {
    self.check_dimension(dimension)?;
    let snap = self.snapshot(patient, instant, use_pov)?;
    Ok(self.classifier.classify(&snap, dimension)?)
  }

  /// Every dimension of the classifier for one patient.
  pub fn patient_states_at(
    &self,
    patient: &str,
    instant: DateTime<Utc>,
    use_pov: bool,
  ) -> Result<PatientStates> {
    let snap = self.snapshot(patient, instant, use_pov)?;
    Ok(self.states_of(&snap))
  }

  /// Every dimension for every known patient.
  pub fn states_at(
    &self,
    instant: DateTime<Utc>,
    use_pov: bool,
  ) -> Result<BTreeMap<PatientId, PatientStates>> {
    let state = self.read()?;
    let board = state
      .directory
      .patients()
      .map(|p| {
        let snap = snapshot_of(&state, p, instant, use_pov);
        (p.patient_id.clone(), self.states_of(&snap))
      })
      .collect();
    Ok(board)
  }

  fn states_of(&self, snap: &FeatureSnapshot) -> PatientStates {
    self
      .classifier
      .dimensions()
      .into_iter()
      .map(|d| {
        let result = self.classifier.classify(snap, &d);
        (d, result)
      })
      .collect()
  }

  fn check_dimension(&self, dimension: &StateDimension) -> Result<()> {
    if self.classifier.dimensions().contains(dimension) {
      Ok(())
    } else {
      Err(Error::UnknownDimension(dimension.to_string()))
    }
  }

  // ── Timelines ─────────────────────────────────────────────────────────

  /// The intervals during which each value of `dimension` held for
  /// `patient`.
  pub fn state_intervals(
    &self,
    patient: &str,
    dimension: &StateDimension,
  ) -> Result<StateTimeline> {
    self.check_dimension(dimension)?;
    let state = self.read()?;
    let patient = lookup_patient(&state.directory, patient)?;
    Ok(self.timeline(&state, patient, dimension))
  }

  /// [`Self::state_intervals`] for every known patient, in parallel.
  pub fn state_intervals_all(
    &self,
    dimension: &StateDimension,
  ) -> Result<BTreeMap<PatientId, StateTimeline>> {
    self.check_dimension(dimension)?;
    let guard = self.read()?;
    let state: &LedgerState = &guard;
    let patients: Vec<&Patient> = state.directory.patients().collect();

    Ok(
      patients
        .par_iter()
        .map(|p| (p.patient_id.clone(), self.timeline(state, p, dimension)))
        .collect(),
    )
  }

  /// Snapshots are taken without the point-of-view cutoff: knowledge arriving
  /// later is folded into the past, so only window bounds can move the
  /// state.
  fn timeline(
    &self,
    state: &LedgerState,
    patient: &Patient,
    dimension: &StateDimension,
  ) -> StateTimeline {
    let breakpoints = interval::breakpoints(&state.log, &state.registry, &patient.patient_id);
    debug!(
      patient = %patient.patient_id,
      %dimension,
      breakpoints = breakpoints.len(),
      "reconstructing timeline"
    );

    interval::reconstruct(&breakpoints, |at| {
      let snap = snapshot_of(state, patient, at, false);
      match self.classifier.classify(&snap, dimension) {
        Ok(value) => Some(value),
        Err(err) => {
          debug!(patient = %patient.patient_id, %at, %err, "no state at breakpoint");
          None
        }
      }
    })
  }

  /// Validity windows of the patient's live observations, optionally merged.
  pub fn coverage(&self, patient: &str, merged: bool) -> Result<Vec<Interval>> {
    let state = self.read()?;
    let patient_id = state.directory.resolve_patient(patient)?;
    let spans = interval::windows(&state.log, &state.registry, &patient_id);
    Ok(if merged { interval::merge(&spans) } else { spans })
  }

  pub fn earliest_entry(&self, patient: &str) -> Result<Option<DateTime<Utc>>> {
    let state = self.read()?;
    let patient_id = state.directory.resolve_patient(patient)?;
    Ok(interval::earliest_entry(&state.log, &patient_id))
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn resolve(directory: &Directory, patient: &str, test: &str) -> Result<(PatientId, TestCode)> {
  let test_code = directory.resolve_test(test)?;
  let patient_id = directory.resolve_patient(patient)?;
  Ok((patient_id, test_code))
}

fn lookup_patient<'a>(directory: &'a Directory, patient: &str) -> Result<&'a Patient> {
  let id = directory.resolve_patient(patient)?;
  directory
    .patient(&id)
    .ok_or_else(|| Error::UnknownPatient(patient.to_owned()))
}

fn snapshot_of(
  state: &LedgerState,
  patient: &Patient,
  instant: DateTime<Utc>,
  use_pov: bool,
) -> FeatureSnapshot {
  snapshot::snapshot(
    &state.log,
    &state.registry,
    &patient.patient_id,
    patient.gender,
    instant,
    use_pov,
  )
}

fn no_measurement(patient: &PatientId, test: &TestCode, valid_time: DateTime<Utc>) -> Error {
  Error::NoMeasurementFound {
    patient: patient.to_string(),
    test: test.to_string(),
    valid_time,
  }
}
