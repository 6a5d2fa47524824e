//! Core types and engines for the Vigil clinical observation store.
//!
//! The store is bitemporal: every observation carries the instant it is
//! clinically valid for and the instant it was recorded. Corrections append
//! new versions; nothing is overwritten except the retraction flag.
//!
//! This crate has no storage or rule dependencies. Durable backends plug in
//! through [`persistence::Persistence`] and clinical rules through
//! [`snapshot::Classifier`].

pub mod clock;
pub mod directory;
pub mod error;
pub mod interval;
pub mod ledger;
pub mod log;
pub mod observation;
pub mod persistence;
pub mod query;
pub mod snapshot;
pub mod window;

pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerState, PatientStates};
