//! [`SqliteStore`]: the SQLite implementation of [`Persistence`].

use std::{
  path::Path,
  sync::{Mutex, MutexGuard},
};

use rusqlite::Connection;
use tracing::{debug, info};
use vigil_core::{
  LedgerState,
  directory::{Patient, TestDefinition},
  log::ObservationLog,
  observation::{Observation, ObservationId, TestCode},
  persistence::{Mutation, Persistence, StorageError},
  window::ValidityWindow,
};

use crate::{
  Error, Result,
  encode::{
    RawObservation, RawPatient, RawTest, encode_dt, encode_gender, encode_seq, encode_value,
    encode_window,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vigil store backed by a single SQLite file.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path.as_ref())?;
    debug!(path = %path.as_ref().display(), "opened sqlite store");
    Self::init(conn)
  }

  /// Open an in-memory store.
  pub fn open_in_memory() -> Result<Self> { Self::init(Connection::open_in_memory()?) }

  fn init(conn: Connection) -> Result<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self { conn: Mutex::new(conn) })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| Error::LockPoisoned)
  }

  // ── Loading ───────────────────────────────────────────────────────────────

  /// Read the directory, the window registry and the full observation log.
  pub fn load(&self) -> Result<LedgerState> {
    let conn = self.conn()?;
    let mut state = LedgerState::default();

    let mut stmt =
      conn.prepare("SELECT patient_id, first_name, last_name, gender, age FROM patients")?;
    let patients = stmt
      .query_map([], |row| {
        Ok(RawPatient {
          patient_id: row.get(0)?,
          first_name: row.get(1)?,
          last_name:  row.get(2)?,
          gender:     row.get(3)?,
          age:        row.get(4)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    for raw in patients {
      state.directory.add_patient(raw.into_patient()?)?;
    }

    let mut stmt = conn.prepare(
      "SELECT code, name, units, good_before_secs, good_after_secs FROM tests",
    )?;
    let tests = stmt
      .query_map([], |row| {
        Ok(RawTest {
          code:             row.get(0)?,
          name:             row.get(1)?,
          units:            row.get(2)?,
          good_before_secs: row.get(3)?,
          good_after_secs:  row.get(4)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    for raw in tests {
      let (test, window) = raw.into_test()?;
      state.registry.register(test.code.clone(), window)?;
      state.directory.add_test(test)?;
    }

    let mut stmt = conn.prepare(
      "SELECT seq, patient_id, test_code, value_json, valid_time, transaction_time, retracted
       FROM observations
       ORDER BY seq",
    )?;
    let observations = stmt
      .query_map([], |row| {
        Ok(RawObservation {
          seq:              row.get(0)?,
          patient_id:       row.get(1)?,
          test_code:        row.get(2)?,
          value_json:       row.get(3)?,
          valid_time:       row.get(4)?,
          transaction_time: row.get(5)?,
          retracted:        row.get(6)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?
      .into_iter()
      .map(RawObservation::into_observation)
      .collect::<Result<Vec<_>>>()?;
    state.log = ObservationLog::from_records(observations);

    info!(
      patients = state.directory.patients().count(),
      tests = state.registry.len(),
      observations = state.log.len(),
      "loaded store"
    );
    Ok(state)
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Write one mutation.
  pub fn apply(&self, mutation: &Mutation<'_>) -> Result<()> {
    let conn = self.conn()?;
    match *mutation {
      Mutation::Append(o) => insert_observation(&conn, o),
      Mutation::Retract(id) => retract(&conn, id),
      Mutation::SetWindow { test, window } => set_window(&conn, test, window),
      Mutation::AddPatient(p) => insert_patient(&conn, p),
      Mutation::AddTest { test, window } => insert_test(&conn, test, window),
    }
  }
}

fn insert_observation(conn: &Connection, o: &Observation) -> Result<()> {
  conn.execute(
    "INSERT INTO observations (
       seq, patient_id, test_code, value_json, valid_time, transaction_time, retracted
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      encode_seq(o.observation_id)?,
      o.patient_id.as_str(),
      o.test_code.as_str(),
      encode_value(&o.value)?,
      encode_dt(o.valid_time),
      encode_dt(o.transaction_time),
      o.retracted,
    ],
  )?;
  Ok(())
}

fn retract(conn: &Connection, id: ObservationId) -> Result<()> {
  let changed = conn.execute(
    "UPDATE observations SET retracted = 1 WHERE seq = ?1",
    rusqlite::params![encode_seq(id)?],
  )?;
  if changed == 0 {
    return Err(vigil_core::Error::NotFound(id).into());
  }
  Ok(())
}

fn set_window(conn: &Connection, test: &TestCode, window: ValidityWindow) -> Result<()> {
  let (before, after) = encode_window(window);
  let changed = conn.execute(
    "UPDATE tests SET good_before_secs = ?2, good_after_secs = ?3 WHERE code = ?1",
    rusqlite::params![test.as_str(), before, after],
  )?;
  if changed == 0 {
    return Err(vigil_core::Error::UnknownTest(test.to_string()).into());
  }
  Ok(())
}

fn insert_patient(conn: &Connection, p: &Patient) -> Result<()> {
  conn.execute(
    "INSERT INTO patients (patient_id, first_name, last_name, gender, age)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      p.patient_id.as_str(),
      p.first_name,
      p.last_name,
      encode_gender(p.gender),
      p.age,
    ],
  )?;
  Ok(())
}

fn insert_test(conn: &Connection, t: &TestDefinition, window: ValidityWindow) -> Result<()> {
  let (before, after) = encode_window(window);
  conn.execute(
    "INSERT INTO tests (code, name, units, good_before_secs, good_after_secs)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![t.code.as_str(), t.name, t.units, before, after],
  )?;
  Ok(())
}

// ─── Persistence impl ────────────────────────────────────────────────────────

impl Persistence for SqliteStore {
  fn flush(&self, mutation: &Mutation<'_>) -> Result<(), StorageError> {
    Ok(self.apply(mutation)?)
  }
}
