use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::batches::BatchStore;
use crate::clock::Clock;
use crate::errors::EngineError;
use crate::ledger::LedgerClient;
use crate::metadata::MetadataRegistry;
use crate::types::{Batch, CleanupReport, Owner};

/// A batch is revealable iff `now - committed_at < threshold`. The boundary
/// is exclusive on the expired side: elapsed equal to the threshold is
/// already expired. A zero `committed_at` marks a legacy record with no
/// commit time and counts as long past, so such batches are swept instead
/// of living forever.
#[must_use]
pub fn is_revealable(batch: &Batch, now: u64, threshold: u64) -> bool {
    if batch.committed_at == 0 {
        return false;
    }
    now.saturating_sub(batch.committed_at) < threshold
}

/// Reveal-threshold source: the configured override when present, otherwise
/// the ledger's on-chain value. Queried fresh on every check, since the
/// value may be reconfigured or changed on the ledger at any time.
pub struct ThresholdSource {
    override_secs: Option<u64>,
    ledger: Arc<dyn LedgerClient>,
}

impl ThresholdSource {
    #[must_use]
    pub fn new(override_secs: Option<u64>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            override_secs,
            ledger,
        }
    }

    pub async fn current(&self) -> Result<u64, EngineError> {
        if let Some(secs) = self.override_secs {
            return Ok(secs);
        }
        self.ledger
            .reveal_threshold()
            .await
            .map_err(EngineError::LedgerReveal)
    }
}

/// Computes batch validity and reclaims expired batches and the metadata
/// they strand.
pub struct LifecycleManager {
    batches: Arc<BatchStore>,
    metadata: Arc<MetadataRegistry>,
    threshold: Arc<ThresholdSource>,
    clock: Arc<dyn Clock>,
}

impl LifecycleManager {
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

    /// Partition all batches at one consistent `now`, drop the expired
    /// subset, and return how many were removed.
    pub async fn sweep_expired_batches(&self) -> Result<usize, EngineError> {
        let threshold = self.threshold.current().await?;
        let now = self.clock.now();
        let removed = self
            .batches
            .sweep(|b| is_revealable(b, now, threshold))
            .await?;
        if !removed.is_empty() {
            info!(count = removed.len(), threshold, "expired batches swept");
        }
        Ok(removed.len())
    }

    /// Remove every metadata entry whose identifier is not covered by a
    /// currently revealable batch. Run after `sweep_expired_batches` in the
    /// same pass so metadata of just-expired batches is reclaimed in the
    /// same cycle.
    pub async fn sweep_orphaned_metadata(&self) -> Result<usize, EngineError> {
        let threshold = self.threshold.current().await?;
        let now = self.clock.now();
        let all = self.batches.list_all().await?;
        let covered: BTreeSet<u64> = all
            .iter()
            .filter(|b| is_revealable(b, now, threshold))
            .flat_map(|b| b.range.ids())
            .collect();
        let removed = self.metadata.retain(&covered).await?;
        if removed > 0 {
            info!(count = removed, "orphaned metadata entries reclaimed");
        }
        Ok(removed)
    }

    /// Batch sweep scoped to one owner's records; other owners' batches are
    /// untouched. Callers should still run a global metadata sweep
    /// afterwards, since the removed batches free identifiers.
    pub async fn sweep_owner_batches(&self, owner: &Owner) -> Result<usize, EngineError> {
        let threshold = self.threshold.current().await?;
        let now = self.clock.now();
        let removed = self
            .batches
            .sweep(|b| &b.owner != owner || is_revealable(b, now, threshold))
            .await?;
        Ok(removed.len())
    }

    /// One full cleanup pass: expired batches first, then the metadata they
    /// stranded. Either sweep failing is reported, not retried inline; the
    /// scheduler re-attempts on its next interval.
    pub async fn run_global_cleanup(&self) -> Result<CleanupReport, EngineError> {
        let batches_removed = self.sweep_expired_batches().await.map_err(|e| {
            warn!(error = %e, "expired-batch sweep failed");
            e
        })?;
        let metadata_removed = self.sweep_orphaned_metadata().await.map_err(|e| {
            warn!(error = %e, "orphaned-metadata sweep failed");
            e
        })?;
        Ok(CleanupReport {
            batches_removed,
            metadata_removed,
        })
    }
}
