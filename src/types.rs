use core::fmt;

use serde::{Deserialize, Serialize};
use veilmint_primitives::Hash256;

/// Account identifier, normalized to its canonical lowercase form on
/// construction so lookups never depend on caller casing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contiguous identifier range covering `[start_id, start_id + count)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRange {
    pub start_id: u64,
    pub count: u64,
}

impl TokenRange {
    /// First identifier past the range.
    #[must_use]
    pub const fn end_exclusive(&self) -> u64 {
        self.start_id + self.count
    }

    #[must_use]
    pub const fn contains(&self, id: u64) -> bool {
        id >= self.start_id && id < self.end_exclusive()
    }

    /// Identifiers of the range, ascending.
    pub fn ids(&self) -> impl Iterator<Item = u64> {
        self.start_id..self.end_exclusive()
    }
}

/// A committed range of identifiers sharing one Merkle root. Immutable once
/// appended, except for deletion by the lifecycle sweeps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub owner: Owner,
    pub range: TokenRange,
    pub root: Hash256,
    /// Ledger acceptance time, seconds. Zero marks a legacy record with no
    /// recorded commit time; the validity predicate treats it as long past.
    #[serde(default)]
    pub committed_at: u64,
    /// Position of the root in the ledger's committed-root history; reveals
    /// reference it so the verifier checks against the right root.
    pub ledger_seq: u64,
}

/// Per-account scheduling state. Owned and mutated by the cadence
/// scheduler; other components only read it for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub last_active_at: u64,
    /// Zero until the first successful issuance.
    pub last_issued_at: u64,
}

/// Which activity transition an `on_activity` signal produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    /// No record existed for the account.
    First,
    /// The account had been silent for longer than the inactivity threshold.
    Returning,
    /// Routine signal from an already-active account.
    Heartbeat,
}

/// Result of an activity signal: the transition taken and the batch issued
/// for it, if the transition warranted one.
#[derive(Clone, Debug)]
pub struct ActivityOutcome {
    pub kind: ActivityKind,
    pub issued: Option<Batch>,
}

/// Payload of a successful reveal: the sibling path, the committed root the
/// ledger should check against (by history position), and the token's URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealBundle {
    pub proof: Vec<Hash256>,
    pub root_ref: u64,
    pub root: Hash256,
    pub uri: String,
}

/// Counters from one cleanup pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub batches_removed: usize,
    pub metadata_removed: usize,
}

/// Result of an explicit account removal: whether a record existed, plus
/// the owner-scoped cleanup that followed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub existed: bool,
    pub cleanup: CleanupReport,
}
