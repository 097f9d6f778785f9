//! End-to-end integration tests for the Veilmint engine.
//!
//! This crate exercises the full commit-reveal pipeline (activity signal,
//! issuance, reveal, expiry, cleanup) over the in-memory store and the
//! mock ledger.

#![forbid(unsafe_code)]
#![deny(warnings)]
