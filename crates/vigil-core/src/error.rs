//! Error types for `vigil-core`.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
  observation::ObservationId,
  persistence::StorageError,
  snapshot::ClassificationError,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown patient: {0:?}")]
  UnknownPatient(String),

  #[error("unknown test: {0:?}")]
  UnknownTest(String),

  #[error("unknown state dimension: {0:?}")]
  UnknownDimension(String),

  #[error("no measurement of {test} for patient {patient} valid at {valid_time}")]
  NoMeasurementFound {
    patient:    String,
    test:       String,
    valid_time: DateTime<Utc>,
  },

  #[error(transparent)]
  Classification(#[from] ClassificationError),

  #[error("observation not found: {0}")]
  NotFound(ObservationId),

  #[error("duplicate registration: {0}")]
  Duplicate(String),

  #[error("invalid validity window: {0}")]
  InvalidWindow(String),

  #[error("invalid value: {0}")]
  InvalidValue(String),

  #[error("invalid date: {0}")]
  InvalidDate(String),

  #[error("ledger lock poisoned: {0}")]
  LockPoisoned(String),

  #[error(transparent)]
  Storage(#[from] StorageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
