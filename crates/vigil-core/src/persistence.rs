//! The persistence seam.
//!
//! The ledger hands every mutation to [`Persistence::flush`] while holding
//! its write lock and before the change becomes visible. A flush failure
//! aborts the operation with nothing applied.

use thiserror::Error;

use crate::{
  directory::{Patient, TestDefinition},
  observation::{Observation, ObservationId, TestCode},
  window::ValidityWindow,
};

/// A single change to durable state.
#[derive(Debug, Clone, Copy)]
pub enum Mutation<'a> {
  Append(&'a Observation),
  Retract(ObservationId),
  SetWindow {
    test:   &'a TestCode,
    window: ValidityWindow,
  },
  AddPatient(&'a Patient),
  AddTest {
    test:   &'a TestDefinition,
    window: ValidityWindow,
  },
}

/// A fatal failure of the storage backend.
#[derive(Debug, Error)]
#[error("storage failure: {0}")]
pub struct StorageError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl StorageError {
  pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    Self(err.into())
  }
}

pub trait Persistence: Send + Sync {
  fn flush(&self, mutation: &Mutation<'_>) -> Result<(), StorageError>;
}

/// Keeps everything in memory only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPersistence;

impl Persistence for NoopPersistence {
  fn flush(&self, _mutation: &Mutation<'_>) -> Result<(), StorageError> { Ok(()) }
}
