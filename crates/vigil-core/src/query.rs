//! Point-in-time and historic retrieval over the observation log.
//!
//! Both modes operate on already-resolved identifiers; name resolution and
//! the `UnknownPatient` / `UnknownTest` checks happen in
//! [`crate::ledger::Ledger`] before any filtering.
//!
//! Retraction is not versioned: a retracted version is invisible to
//! point-in-time queries for every point of view, including ones earlier than
//! the retraction itself. Historic queries see everything.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  log::ObservationLog,
  observation::{Observation, ObservationId, PatientId, TestCode, Value},
};

// ─── Target ──────────────────────────────────────────────────────────────────

/// The valid-time target of a query: an exact instant, or a whole calendar
/// day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ValidTarget {
  Instant(DateTime<Utc>),
  Day(NaiveDate),
}

impl ValidTarget {
  pub fn day(&self) -> NaiveDate {
    match self {
      Self::Instant(t) => t.date_naive(),
      Self::Day(d) => *d,
    }
  }

  /// Exact instant match, or same calendar day for date-only targets.
  pub fn matches(&self, valid_time: DateTime<Utc>) -> bool {
    match self {
      Self::Instant(t) => valid_time == *t,
      Self::Day(d) => valid_time.date_naive() == *d,
    }
  }

  /// The earliest instant the target denotes.
  pub fn lower_bound(&self) -> DateTime<Utc> {
    match self {
      Self::Instant(t) => *t,
      Self::Day(d) => start_of_day(*d),
    }
  }

  /// The latest instant the target denotes.
  pub fn upper_bound(&self) -> DateTime<Utc> {
    match self {
      Self::Instant(t) => *t,
      Self::Day(d) => end_of_day(*d),
    }
  }

  /// Default point of view: the last instant of the target's day.
  pub fn default_pov(&self) -> DateTime<Utc> { end_of_day(self.day()) }
}

/// Either an instant or, failing that, a calendar day.
impl FromStr for ValidTarget {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    parse_instant(s)
      .map(Self::Instant)
      .or_else(|_| parse_date(s).map(Self::Day))
  }
}

const INSTANT_FORMATS: [&str; 2] = ["%d.%m.%Y %H:%M", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: [&str; 2] = ["%d.%m.%Y", "%Y-%m-%d"];

/// Parse RFC 3339, `DD.MM.YYYY HH:MM` or `YYYY-MM-DD HH:MM`; the last two are
/// taken as UTC.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  INSTANT_FORMATS
    .iter()
    .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    .map(|naive| naive.and_utc())
    .ok_or_else(|| Error::InvalidDate(s.to_owned()))
}

/// Parse `DD.MM.YYYY` or `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
  let s = s.trim();
  DATE_FORMATS
    .iter()
    .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
    .ok_or_else(|| Error::InvalidDate(s.to_owned()))
}

pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
  NaiveDateTime::from(day).and_utc()
}

/// The last nanosecond of `day`, saturating on the final representable day.
pub fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
  start_of_day(day)
    .checked_add_signed(TimeDelta::days(1) - TimeDelta::nanoseconds(1))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ─── Point-in-time ───────────────────────────────────────────────────────────

/// The single version of `(patient, test, target)` visible as of `pov`.
///
/// Retracted versions and versions recorded after `pov` are ignored. Among
/// the rest the greatest transaction time wins; equal transaction times are
/// broken by insertion order (latest wins). `pov` defaults to the end of the
/// target's day.
pub fn point_in_time<'a>(
  log: &'a ObservationLog,
  patient: &PatientId,
  test: &TestCode,
  target: ValidTarget,
  pov: Option<DateTime<Utc>>,
) -> Option<&'a Observation> {
  let pov = pov.unwrap_or_else(|| target.default_pov());
  let test = test.clone();

  log
    .scan_patient(patient, move |o| {
      o.test_code == test
        && !o.retracted
        && o.transaction_time <= pov
        && target.matches(o.valid_time)
    })
    .max_by_key(|o| o.version_key())
}

// ─── Historic ────────────────────────────────────────────────────────────────

/// Every version of `(patient, test)` whose valid time lies in
/// `[earliest, latest]`, retracted ones included, newest transaction first.
///
/// No point-of-view cutoff is applied. `earliest` defaults to the beginning
/// of representable time.
pub fn historic<'a>(
  log: &'a ObservationLog,
  patient: &PatientId,
  test: &TestCode,
  earliest: Option<ValidTarget>,
  latest: ValidTarget,
) -> Vec<&'a Observation> {
  let from = earliest.map_or(DateTime::<Utc>::MIN_UTC, |e| e.lower_bound());
  let to = latest.upper_bound();
  let test = test.clone();

  let mut rows: Vec<_> = log
    .scan_patient(patient, move |o| {
      o.test_code == test && from <= o.valid_time && o.valid_time <= to
    })
    .collect();
  rows.sort_by(|a, b| b.version_key().cmp(&a.version_key()));
  rows
}

// ─── Corrections ─────────────────────────────────────────────────────────────

/// The version of the fact at exactly `valid_time` visible as of `now`; the
/// target of both update and delete.
pub fn locate_current<'a>(
  log: &'a ObservationLog,
  patient: &PatientId,
  test: &TestCode,
  valid_time: DateTime<Utc>,
  now: DateTime<Utc>,
) -> Option<&'a Observation> {
  point_in_time(log, patient, test, ValidTarget::Instant(valid_time), Some(now))
}

/// A new version of `current` carrying `value`, recorded at `at`.
pub fn corrected_version(
  current: &Observation,
  id: ObservationId,
  value: Value,
  at: DateTime<Utc>,
) -> Observation {
  Observation {
    observation_id: id,
    value,
    transaction_time: at,
    retracted: false,
    ..current.clone()
  }
}
