use thiserror::Error;
use veilmint_primitives::TreeError;

use crate::types::Owner;

/// Failures surfaced by the persistent store seam.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization: {0}")]
    Serialization(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures surfaced by the ledger client seam.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("confirmation timed out after {0}s")]
    Timeout(u64),

    #[error("transport: {0}")]
    Transport(String),
}

/// Engine-level error taxonomy. Validity and not-found variants are routine
/// reported outcomes; `MissingMetadata` and `RootMismatch` are consistency
/// violations that should never occur.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("identifier allocation failed: {0}")]
    Allocation(StoreError),

    #[error("invalid allocation count: {0}")]
    InvalidCount(u64),

    #[error("ledger commit failed: {0}")]
    LedgerCommit(LedgerError),

    #[error("ledger query failed: {0}")]
    LedgerReveal(LedgerError),

    #[error("no batch owns token {id} for {owner}")]
    NotFound { owner: Owner, id: u64 },

    #[error("batch expired: elapsed {elapsed}s, reveal threshold {threshold}s")]
    Expired { elapsed: u64, threshold: u64 },

    #[error("metadata missing for token {id}")]
    MissingMetadata { id: u64 },

    #[error("rebuilt root {rebuilt} does not match committed root {committed}")]
    RootMismatch { committed: String, rebuilt: String },

    #[error("tree construction: {0}")]
    Tree(#[from] TreeError),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True for the two internal-consistency variants that warrant alerting
    /// rather than routine error reporting.
    #[must_use]
    pub const fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::MissingMetadata { .. } | Self::RootMismatch { .. })
    }
}
