//! Interval reconstruction: turning point-in-time classifications into the
//! periods during which each derived state value held.
//!
//! A derived state is a step function of time that can only change where
//! some observation's validity window opens or closes. Sampling the state at
//! exactly those instants, and nowhere else, therefore finds every
//! transition.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
  log::ObservationLog,
  observation::PatientId,
  snapshot::StateValue,
  window::WindowRegistry,
};

/// A closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

/// Per state value, its intervals in the order they were opened.
///
/// Intervals of one value never overlap each other; intervals of different
/// values are not merged and may share endpoints.
pub type StateTimeline = BTreeMap<StateValue, Vec<Interval>>;

/// The validity windows `[start, end]` of every non-retracted observation of
/// a registered test, sorted by start (then end).
pub fn windows(
  log: &ObservationLog,
  registry: &WindowRegistry,
  patient: &PatientId,
) -> Vec<Interval> {
  let mut spans: Vec<Interval> = log
    .scan_patient(patient, |o| !o.retracted)
    .filter_map(|o| match registry.lookup(&o.test_code) {
      Ok(w) => Some(Interval { start: w.start(o.valid_time), end: w.end(o.valid_time) }),
      Err(_) => {
        warn!(
          test = %o.test_code,
          id = %o.observation_id,
          "skipping observation of unregistered test"
        );
        None
      }
    })
    .collect();
  spans.sort_by_key(|i| (i.start, i.end));
  spans
}

/// Candidate change points: both window bounds of every window, deduplicated
/// and ascending.
pub fn breakpoints(
  log: &ObservationLog,
  registry: &WindowRegistry,
  patient: &PatientId,
) -> Vec<DateTime<Utc>> {
  windows(log, registry, patient)
    .into_iter()
    .flat_map(|i| [i.start, i.end])
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

/// Walk `breakpoints` in order, sampling the state at each, and record the
/// interval each value held.
///
/// `sample` returns `None` when no value could be determined. That sentinel
/// closes any open interval but never opens one. Whatever is still open after
/// the last breakpoint is closed at the last breakpoint.
pub fn reconstruct<F>(breakpoints: &[DateTime<Utc>], mut sample: F) -> StateTimeline
where
  F: FnMut(DateTime<Utc>) -> Option<StateValue>,
{
  let Some(&last) = breakpoints.last() else {
    return StateTimeline::new();
  };

  let mut spans: BTreeMap<StateValue, Vec<(DateTime<Utc>, Option<DateTime<Utc>>)>> =
    BTreeMap::new();
  let mut current: Option<StateValue> = None;

  for &at in breakpoints {
    let next = sample(at);
    if next == current {
      continue;
    }

    if let Some(prev) = &current
      && let Some(open) = spans.get_mut(prev).and_then(|s| s.last_mut())
    {
      open.1 = Some(at);
    }
    if let Some(value) = &next {
      spans.entry(value.clone()).or_default().push((at, None));
    }

    debug!(%at, from = ?current, to = ?next, "state transition");
    current = next;
  }

  spans
    .into_iter()
    .map(|(value, list)| {
      let intervals = list
        .into_iter()
        .map(|(start, end)| Interval { start, end: end.unwrap_or(last) })
        .collect();
      (value, intervals)
    })
    .collect()
}

/// Coalesce overlapping or touching intervals. Input must be sorted by start.
pub fn merge(sorted: &[Interval]) -> Vec<Interval> {
  let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
  for &next in sorted {
    match merged.last_mut() {
      Some(open) if next.start <= open.end => open.end = open.end.max(next.end),
      _ => merged.push(next),
    }
  }
  merged
}

/// The earliest valid time of any observation of `patient`, retracted ones
/// included.
pub fn earliest_entry(log: &ObservationLog, patient: &PatientId) -> Option<DateTime<Utc>> {
  log.scan_patient(patient, |_| true).map(|o| o.valid_time).min()
}
