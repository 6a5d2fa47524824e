//! JSON shapes for command results that have no natural serde form.

use serde_json::{Map, Value, json};
use vigil_core::{
  PatientStates,
  directory::TestDefinition,
  window::ValidityWindow,
};
use vigil_rules::{Dimension, states::Treatment};

/// One object per dimension: the state name, or `{ "error": ... }`.
/// Treatments carry their protocol text.
pub fn states(states: &PatientStates) -> Value {
  states
    .iter()
    .map(|(dimension, result)| {
      let rendered = match result {
        Ok(state) if dimension.as_str() == Dimension::Treatment.as_ref() => {
          match state.as_str().parse::<Treatment>() {
            Ok(t) => json!({ "value": state, "protocol": t.protocol() }),
            Err(_) => json!(state),
          }
        }
        Ok(state) => json!(state),
        Err(e) => json!({ "error": e.to_string() }),
      };
      (dimension.to_string(), rendered)
    })
    .collect::<Map<_, _>>()
    .into()
}

pub fn tests(tests: &[(TestDefinition, Option<ValidityWindow>)]) -> Value {
  tests
    .iter()
    .map(|(test, window)| json!({ "test": test, "window": window }))
    .collect()
}
