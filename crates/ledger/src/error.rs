//! Ledger errors

use thiserror::Error;

/// Errors that can occur against the deployment ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (duplicate node name, reservation address, cluster name)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backing store failure
    #[error("Ledger backend error: {0}")]
    Backend(String),
}
