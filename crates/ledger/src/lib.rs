//! Deployment Ledger
//!
//! The sole persisted deployment history for the node-lifecycle services:
//! mutable node/reservation/name-record/interface/cluster rows plus an
//! append-only deployment event log.
//!
//! The [`Ledger`] trait is the storage seam — orchestrator, compensation
//! engine, and status machine consume it as a supplied collaborator, never
//! through a global instance. [`MemoryLedger`] is the in-process
//! implementation. No ledger operation spans more than a single row; saga
//! steps get their atomicity from idempotent upserts keyed by node name, not
//! from cross-row transactions.

pub mod error;
pub mod memory;
pub mod models;
#[path = "trait.rs"]
pub mod ledger_trait;

pub use error::LedgerError;
pub use ledger_trait::Ledger;
pub use memory::MemoryLedger;
pub use models::*;
