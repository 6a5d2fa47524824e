//! Argument parsers for clap.

use chrono::TimeDelta;
use vigil_core::observation::Value;

/// A `days,hours,minutes` triple, e.g. `0,12,0`.
pub fn duration(s: &str) -> Result<TimeDelta, String> {
  let parts = s
    .split(',')
    .map(|p| p.trim().parse::<i64>())
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| format!("invalid duration {s:?}: {e}"))?;

  let &[days, hours, minutes] = parts.as_slice() else {
    return Err(format!("invalid duration {s:?}: expected days,hours,minutes"));
  };
  TimeDelta::try_days(days)
    .zip(TimeDelta::try_hours(hours))
    .zip(TimeDelta::try_minutes(minutes))
    .map(|((d, h), m)| d + h + m)
    .ok_or_else(|| format!("duration out of range: {s:?}"))
}

/// Numbers become numeric values; anything else is kept as text.
pub fn value(s: &str) -> Result<Value, String> {
  Ok(match s.trim().parse::<f64>() {
    Ok(n) if n.is_finite() => Value::Number(n),
    _ => Value::Text(s.to_owned()),
  })
}
