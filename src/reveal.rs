use std::sync::Arc;

use tracing::error;
use veilmint_primitives::{ct_eq_hash, MerkleTree};

use crate::batches::BatchStore;
use crate::clock::Clock;
use crate::errors::EngineError;
use crate::lifecycle::{is_revealable, ThresholdSource};
use crate::metadata::MetadataRegistry;
use crate::types::{Owner, RevealBundle};

/// Rebuilds a historical batch's tree and extracts the inclusion proof for
/// one identifier. Read-only; the actual ledger submission is the caller's
/// concern.
pub struct ProofService {
    batches: Arc<BatchStore>,
    metadata: Arc<MetadataRegistry>,
    threshold: Arc<ThresholdSource>,
    clock: Arc<dyn Clock>,
}

impl ProofService {
    #[must_use]
    pub fn new(
        batches: Arc<BatchStore>,
        metadata: Arc<MetadataRegistry>,
        threshold: Arc<ThresholdSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            batches,
            metadata,
            threshold,
            clock,
        }
    }

    pub async fn reveal(&self, owner: &Owner, id: u64) -> Result<RevealBundle, EngineError> {
        // 1) Owning batch.
        let batch = self
            .batches
            .find_owning(owner, id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                owner: owner.clone(),
                id,
            })?;

        // 2) Validity window, threshold read fresh.
        let threshold = self.threshold.current().await?;
        let now = self.clock.now();
        if !is_revealable(&batch, now, threshold) {
            return Err(EngineError::Expired {
                elapsed: now.saturating_sub(batch.committed_at),
                threshold,
            });
        }

        // 3) Metadata entry. Absence here breaks the metadata-lifecycle
        //    invariant: alert, don't treat as a routine miss.
        let uri = match self.metadata.get(id).await? {
            Some(uri) => uri,
            None => {
                error!(id, owner = %owner, "metadata missing for token inside a valid batch");
                return Err(EngineError::MissingMetadata { id });
            }
        };

        // 4) Rebuild over the batch's entire range; the root must equal the
        //    committed digest or local state has diverged from the ledger.
        let ids: Vec<u64> = batch.range.ids().collect();
        let tree = MerkleTree::build(&ids)?;
        let rebuilt = tree.root();
        if !ct_eq_hash(&rebuilt, &batch.root) {
            error!(
                owner = %owner,
                start = batch.range.start_id,
                committed = %hex::encode(batch.root),
                rebuilt = %hex::encode(rebuilt),
                "rebuilt root diverges from committed root"
            );
            return Err(EngineError::RootMismatch {
                committed: hex::encode(batch.root),
                rebuilt: hex::encode(rebuilt),
            });
        }

        // 5) Extract the path. The id is inside the rebuilt range, so a
        //    missing proof can only mean the tree and range disagree.
        let proof = tree.proof(id).ok_or(EngineError::MissingMetadata { id })?;
        Ok(RevealBundle {
            proof: proof.siblings,
            root_ref: batch.ledger_seq,
            root: rebuilt,
            uri,
        })
    }
}
