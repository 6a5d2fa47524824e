//! Patients, test definitions, and the identity resolver that maps
//! human-readable names onto their identifiers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error, Result,
  observation::{PatientId, TestCode},
};

// ─── Patient ─────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Gender {
  Male,
  Female,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
  pub patient_id: PatientId,
  pub first_name: String,
  pub last_name:  String,
  pub gender:     Option<Gender>,
  pub age:        Option<u32>,
}

impl Patient {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}

// ─── Test definition ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
  pub code:  TestCode,
  /// Human-readable component name, e.g. "Hemoglobin".
  pub name:  String,
  pub units: Option<String>,
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Maps names or identifiers onto canonical identifiers.
pub trait IdentityResolver {
  fn resolve_patient(&self, name_or_id: &str) -> Result<PatientId>;

  fn resolve_test(&self, name_or_code: &str) -> Result<TestCode>;
}

/// In-memory registry of known patients and tests.
#[derive(Debug, Clone, Default)]
pub struct Directory {
  patients: BTreeMap<PatientId, Patient>,
  tests:    BTreeMap<TestCode, TestDefinition>,
}

impl Directory {
  pub fn new() -> Self { Self::default() }

  pub fn add_patient(&mut self, patient: Patient) -> Result<()> {
    if self.patients.contains_key(&patient.patient_id) {
      return Err(Error::Duplicate(format!("patient {}", patient.patient_id)));
    }
    self.patients.insert(patient.patient_id.clone(), patient);
    Ok(())
  }

  pub fn add_test(&mut self, test: TestDefinition) -> Result<()> {
    if self.tests.contains_key(&test.code) {
      return Err(Error::Duplicate(format!("test {}", test.code)));
    }
    self.tests.insert(test.code.clone(), test);
    Ok(())
  }

  pub fn patient(&self, id: &PatientId) -> Option<&Patient> { self.patients.get(id) }

  pub fn test(&self, code: &TestCode) -> Option<&TestDefinition> { self.tests.get(code) }

  /// All patients, ordered by identifier.
  pub fn patients(&self) -> impl Iterator<Item = &Patient> { self.patients.values() }

  /// All tests, ordered by code.
  pub fn tests(&self) -> impl Iterator<Item = &TestDefinition> { self.tests.values() }
}

impl IdentityResolver for Directory {
  /// Full names take precedence over identifiers.
  fn resolve_patient(&self, name_or_id: &str) -> Result<PatientId> {
    if let Some(p) = self.patients.values().find(|p| p.full_name() == name_or_id) {
      return Ok(p.patient_id.clone());
    }
    let id = PatientId::from(name_or_id);
    if self.patients.contains_key(&id) {
      return Ok(id);
    }
    Err(Error::UnknownPatient(name_or_id.to_owned()))
  }

  /// Test names take precedence over codes.
  fn resolve_test(&self, name_or_code: &str) -> Result<TestCode> {
    if let Some(t) = self.tests.values().find(|t| t.name == name_or_code) {
      return Ok(t.code.clone());
    }
    let code = TestCode::from(name_or_code);
    if self.tests.contains_key(&code) {
      return Ok(code);
    }
    Err(Error::UnknownTest(name_or_code.to_owned()))
  }
}
