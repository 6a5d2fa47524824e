//! SQLite backend for the Vigil observation store.
//!
//! [`SqliteStore`] loads the full ledger state once at startup and then acts
//! as the ledger's [`vigil_core::persistence::Persistence`]: every mutation is
//! written here before it becomes visible in memory.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
