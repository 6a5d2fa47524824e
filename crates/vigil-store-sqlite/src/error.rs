//! Error type for `vigil-store-sqlite`.

use thiserror::Error;
use vigil_core::persistence::StorageError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] vigil_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row could not be turned back into a domain value.
  #[error("corrupt row: {0}")]
  Decode(String),

  #[error("connection lock poisoned")]
  LockPoisoned,
}

impl From<Error> for StorageError {
  fn from(e: Error) -> Self { StorageError::new(e) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
