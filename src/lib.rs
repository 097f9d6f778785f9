#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! Veilmint Engine — batch commit-reveal token issuance.
//!
//! The engine batches freshly allocated token identifiers, commits a
//! Keccak-256 Merkle root per batch to an external ledger, and later
//! proves individual identifiers' membership so their metadata can be
//! revealed while the batch is still inside its reveal window.
//
// Core responsibilities:
//
// 1. Linearizable identifier-range allocation (no overlap, no reuse)
// 2. Canonical leaves and sorted-pair Merkle commitments that match the
//    ledger-side verifier exactly
// 3. Time-windowed batch validity and expiration sweeps
// 4. Per-account issuance cadence without duplicate-issuance storms
//
// The HTTP layer, environment loading, the real ledger transport, and the
// selection-weight source are external; their seams are the `StateStore`,
// `LedgerClient`, and `UriPicker` traits.

pub mod allocator;
pub mod batches;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod lifecycle;
pub mod metadata;
pub mod picker;
pub mod reveal;
pub mod scheduler;
pub mod store;
pub mod types;

pub use allocator::IdAllocator;
pub use batches::BatchStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{EngineTasks, Issuer, MintEngine};
pub use errors::{EngineError, LedgerError, StoreError};
pub use ledger::{LedgerClient, LedgerConfirmation, MockLedger};
pub use lifecycle::{is_revealable, LifecycleManager, ThresholdSource};
pub use metadata::MetadataRegistry;
pub use picker::{FixedPicker, UriPicker, WeightedPicker};
pub use reveal::ProofService;
pub use scheduler::CadenceScheduler;
pub use store::{JsonStore, MemoryStore, StateStore};
pub use types::{
    AccountRecord, ActivityKind, ActivityOutcome, Batch, CleanupReport, Owner, RemovalOutcome,
    RevealBundle, TokenRange,
};

/// Crate version, for reporting payloads.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
