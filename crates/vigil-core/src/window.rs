//! Validity windows and the per-test registry that holds them.
//!
//! A reading of test X taken at `valid_time` is considered representative of
//! the patient's state throughout
//! `[valid_time - good_before, valid_time + good_after]`.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, observation::TestCode};

// ─── ValidityWindow ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
  #[serde(with = "seconds")]
  good_before: TimeDelta,
  #[serde(with = "seconds")]
  good_after:  TimeDelta,
}

impl ValidityWindow {
  /// Build a window; both durations must be non-negative whole seconds.
  pub fn new(good_before: TimeDelta, good_after: TimeDelta) -> Result<Self> {
    if good_before < TimeDelta::zero() || good_after < TimeDelta::zero() {
      return Err(Error::InvalidWindow(format!(
        "durations must be non-negative (before {good_before}, after {good_after})"
      )));
    }
    if good_before.subsec_nanos() != 0 || good_after.subsec_nanos() != 0 {
      return Err(Error::InvalidWindow(format!(
        "durations must be whole seconds (before {good_before}, after {good_after})"
      )));
    }
    Ok(Self { good_before, good_after })
  }

  pub fn good_before(&self) -> TimeDelta { self.good_before }

  pub fn good_after(&self) -> TimeDelta { self.good_after }

  /// First instant at which a reading valid at `valid_time` applies.
  /// Saturates at the earliest representable instant.
  pub fn start(&self, valid_time: DateTime<Utc>) -> DateTime<Utc> {
    valid_time
      .checked_sub_signed(self.good_before)
      .unwrap_or(DateTime::<Utc>::MIN_UTC)
  }

  /// Last instant at which a reading valid at `valid_time` applies.
  /// Saturates at the latest representable instant.
  pub fn end(&self, valid_time: DateTime<Utc>) -> DateTime<Utc> {
    valid_time
      .checked_add_signed(self.good_after)
      .unwrap_or(DateTime::<Utc>::MAX_UTC)
  }

  /// Both bounds are inclusive.
  pub fn covers(&self, valid_time: DateTime<Utc>, instant: DateTime<Utc>) -> bool {
    self.start(valid_time) <= instant && instant <= self.end(valid_time)
  }
}

mod seconds {
  use chrono::TimeDelta;
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(d: &TimeDelta, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_seconds())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TimeDelta, D::Error> {
    let secs = i64::deserialize(d)?;
    TimeDelta::try_seconds(secs)
      .ok_or_else(|| D::Error::custom(format!("duration out of range: {secs}s")))
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Per-test lookup of validity windows.
///
/// Windows may be changed at runtime; readers always see the latest value and
/// no history of earlier windows is kept.
#[derive(Debug, Clone, Default)]
pub struct WindowRegistry {
  windows: HashMap<TestCode, ValidityWindow>,
}

impl WindowRegistry {
  pub fn new() -> Self { Self::default() }

  /// Register a window for a test not yet known to the registry.
  pub fn register(&mut self, code: TestCode, window: ValidityWindow) -> Result<()> {
    if self.windows.contains_key(&code) {
      return Err(Error::Duplicate(format!("test {code}")));
    }
    self.windows.insert(code, window);
    Ok(())
  }

  /// Replace the window of an already-registered test.
  pub fn update(&mut self, code: &TestCode, window: ValidityWindow) -> Result<()> {
    match self.windows.get_mut(code) {
      Some(slot) => {
        *slot = window;
        Ok(())
      }
      None => Err(Error::UnknownTest(code.to_string())),
    }
  }

  pub fn lookup(&self, code: &TestCode) -> Result<ValidityWindow> {
    self
      .windows
      .get(code)
      .copied()
      .ok_or_else(|| Error::UnknownTest(code.to_string()))
  }

  pub fn contains(&self, code: &TestCode) -> bool { self.windows.contains_key(code) }

  pub fn len(&self) -> usize { self.windows.len() }

  pub fn is_empty(&self) -> bool { self.windows.is_empty() }
}
