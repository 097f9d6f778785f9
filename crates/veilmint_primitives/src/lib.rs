#![forbid(unsafe_code)]
#![deny(
    warnings,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! Veilmint primitives: Keccak-256 hashing, canonical token-leaf encoding,
//! and sorted-pair binary Merkle trees.
//
// This crate implements the normative commitment utilities shared by the
// engine and any off-process verifier:
//
// - Keccak-256 digests (the ledger contract's hash)
// - Canonical leaf = Keccak-256 of the decimal string encoding of the id
// - Sorted-pair node combination (proofs carry no position bits)
// - Lone-node promotion at odd levels
// - Constant-time equality for 32-byte digests

use sha3::{Digest, Keccak256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// 32-byte hash (Keccak-256 output).
pub type Hash256 = [u8; 32];

/// Keccak-256 over the concatenation of `parts`.
#[must_use]
pub fn keccak256(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Keccak256::new();
    for p in parts {
        hasher.update(p);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Canonical leaf for a token identifier: Keccak-256 of the decimal string
/// encoding of `id`, UTF-8. The metadata URI is never part of the leaf; the
/// ledger-side verifier must recompute leaves with the same rule.
#[must_use]
pub fn token_leaf(id: u64) -> Hash256 {
    let decimal = id.to_string();
    keccak256(&[decimal.as_bytes()])
}

/// Combine two child digests into a parent: hash-order the pair, then
/// Keccak-256 the 64-byte concatenation. Ordering makes verification
/// independent of the leaf's left/right position.
#[must_use]
pub fn combine_sorted(a: &Hash256, b: &Hash256) -> Hash256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut cat = [0u8; 64];
    cat[..32].copy_from_slice(lo);
    cat[32..].copy_from_slice(hi);
    keccak256(&[&cat])
}

/// Constant-time equality for two 32-byte digests.
#[must_use]
pub fn ct_eq_hash(a: &Hash256, b: &Hash256) -> bool {
    a.ct_eq(b).into()
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree has no leaves")]
    Empty,
}

/// Sibling hashes from leaf to root. Verification re-sorts at every step,
/// so the path carries no index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub siblings: Vec<Hash256>,
}

/// A fully materialized tree over a set of token identifiers.
///
/// Identifiers are sorted (and deduplicated) before leaf construction, so
/// identical id sets yield identical roots regardless of input order. A lone
/// node at any level is promoted unchanged to the next level; duplication
/// would let it pair with itself under the sorted-pair rule and change the
/// root.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    ids: Vec<u64>,
    levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Build the tree over `leaf(id)` for each distinct id, ascending.
    pub fn build(ids: &[u64]) -> Result<Self, TreeError> {
        if ids.is_empty() {
            return Err(TreeError::Empty);
        }
        let mut sorted: Vec<u64> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let leaves: Vec<Hash256> = sorted.iter().map(|id| token_leaf(*id)).collect();
        let mut levels = vec![leaves];
        loop {
            let prev = &levels[levels.len() - 1];
            if prev.len() == 1 {
                break;
            }
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            let mut i = 0usize;
            while i + 1 < prev.len() {
                next.push(combine_sorted(&prev[i], &prev[i + 1]));
                i += 2;
            }
            if i < prev.len() {
                // Lone node: promoted unchanged.
                next.push(prev[i]);
            }
            levels.push(next);
        }
        Ok(Self { ids: sorted, levels })
    }

    /// Number of distinct leaves.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.ids.len()
    }

    /// Root digest. Length one is guaranteed by construction.
    #[must_use]
    pub fn root(&self) -> Hash256 {
        self.levels[self.levels.len() - 1][0]
    }

    /// Inclusion proof for `id`, or `None` if the id is not a leaf.
    #[must_use]
    pub fn proof(&self, id: u64) -> Option<MerkleProof> {
        let mut pos = self.ids.binary_search(&id).ok()?;
        let mut siblings = Vec::new();
        for level in &self.levels[..self.levels.len() - 1] {
            let sib = pos ^ 1;
            if sib < level.len() {
                siblings.push(level[sib]);
            }
            pos /= 2;
        }
        Some(MerkleProof { siblings })
    }
}

/// Recompute the root from `leaf` along `proof` and compare against `root`.
#[must_use]
pub fn verify_inclusion(root: &Hash256, leaf: &Hash256, proof: &MerkleProof) -> bool {
    let mut acc = *leaf;
    for sib in &proof.siblings {
        acc = combine_sorted(&acc, sib);
    }
    ct_eq_hash(root, &acc)
}
