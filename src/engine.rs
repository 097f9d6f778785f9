use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use veilmint_primitives::MerkleTree;

use crate::allocator::IdAllocator;
use crate::batches::BatchStore;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::errors::{EngineError, LedgerError};
use crate::ledger::LedgerClient;
use crate::lifecycle::{LifecycleManager, ThresholdSource};
use crate::metadata::MetadataRegistry;
use crate::picker::UriPicker;
use crate::reveal::ProofService;
use crate::scheduler::CadenceScheduler;
use crate::store::StateStore;
use crate::types::{
    AccountRecord, ActivityOutcome, Batch, CleanupReport, Owner, RemovalOutcome, RevealBundle,
};

/// One issuance: allocate a range, assign metadata, build the tree, commit
/// the root to the ledger (bounded wait), and only then record the batch.
/// A failure at any step leaves no batch behind; the allocated range
/// becomes a gap and its metadata is reclaimed by the next orphan sweep.
pub struct Issuer {
    allocator: IdAllocator,
    batches: Arc<BatchStore>,
    metadata: Arc<MetadataRegistry>,
    picker: Arc<dyn UriPicker>,
    ledger: Arc<dyn LedgerClient>,
    batch_size: u64,
    ledger_timeout: Duration,
}

impl Issuer {
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        batches: Arc<BatchStore>,
        metadata: Arc<MetadataRegistry>,
        picker: Arc<dyn UriPicker>,
        ledger: Arc<dyn LedgerClient>,
        batch_size: u64,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            allocator: IdAllocator::new(store),
            batches,
            metadata,
            picker,
            ledger,
            batch_size,
            ledger_timeout,
        }
    }

    pub async fn issue_for(&self, owner: &Owner) -> Result<Batch, EngineError> {
        let range = self.allocator.allocate(self.batch_size).await?;
        self.metadata.assign(range, self.picker.as_ref()).await?;

        let ids: Vec<u64> = range.ids().collect();
        let tree = MerkleTree::build(&ids)?;
        let root = tree.root();

        let confirmation = tokio::time::timeout(self.ledger_timeout, self.ledger.commit_root(root))
            .await
            .map_err(|_| {
                EngineError::LedgerCommit(LedgerError::Timeout(self.ledger_timeout.as_secs()))
            })?
            .map_err(EngineError::LedgerCommit)?;

        let batch = Batch {
            owner: owner.clone(),
            range,
            root,
            committed_at: confirmation.committed_at,
            ledger_seq: confirmation.sequence,
        };
        self.batches.append(batch.clone()).await?;
        info!(
            owner = %owner,
            start = range.start_id,
            count = range.count,
            seq = confirmation.sequence,
            root = %hex::encode(root),
            "batch committed"
        );
        Ok(batch)
    }
}

/// The engine façade: wires allocator, stores, proof service, lifecycle,
/// and cadence scheduler, and exposes the outward operations consumed by
/// the request layer.
pub struct MintEngine {
    config: EngineConfig,
    scheduler: CadenceScheduler,
    proofs: ProofService,
    lifecycle: LifecycleManager,
    batches: Arc<BatchStore>,
}

impl MintEngine {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn StateStore>,
        ledger: Arc<dyn LedgerClient>,
        picker: Arc<dyn UriPicker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let batches = Arc::new(BatchStore::new(store.clone()));
        let metadata = Arc::new(MetadataRegistry::new(store.clone()));
        let threshold = Arc::new(ThresholdSource::new(
            config.reveal_threshold_override,
            ledger.clone(),
        ));
        let issuer = Arc::new(Issuer::new(
            store.clone(),
            batches.clone(),
            metadata.clone(),
            picker,
            ledger,
            config.batch_size,
            config.ledger_timeout,
        ));
        let scheduler = CadenceScheduler::new(
            store,
            issuer,
            clock.clone(),
            config.mint_interval,
            config.inactivity_threshold,
        );
        let proofs = ProofService::new(
            batches.clone(),
            metadata.clone(),
            threshold.clone(),
            clock.clone(),
        );
        let lifecycle = LifecycleManager::new(batches.clone(), metadata, threshold, clock);
        Self {
            config,
            scheduler,
            proofs,
            lifecycle,
            batches,
        }
    }

    /// Activity signal for an account; issues on transitions into activity.
    pub async fn trigger_activity(&self, owner: &str) -> Result<ActivityOutcome, EngineError> {
        self.scheduler.on_activity(&Owner::new(owner)).await
    }

    /// Inclusion proof for one identifier of a still-revealable batch.
    pub async fn request_reveal(&self, owner: &str, id: u64) -> Result<RevealBundle, EngineError> {
        self.proofs.reveal(&Owner::new(owner), id).await
    }

    pub async fn list_batches(&self, owner: &str) -> Result<Vec<Batch>, EngineError> {
        Ok(self.batches.list_by_owner(&Owner::new(owner)).await?)
    }

    /// Expired-batch sweep followed by the orphaned-metadata sweep.
    pub async fn run_global_cleanup(&self) -> Result<CleanupReport, EngineError> {
        self.lifecycle.run_global_cleanup().await
    }

    /// Owner-scoped batch sweep plus a global metadata sweep, since the
    /// removed batches free identifiers.
    pub async fn run_owner_cleanup(&self, owner: &str) -> Result<CleanupReport, EngineError> {
        let batches_removed = self.lifecycle.sweep_owner_batches(&Owner::new(owner)).await?;
        let metadata_removed = self.lifecycle.sweep_orphaned_metadata().await?;
        Ok(CleanupReport {
            batches_removed,
            metadata_removed,
        })
    }

    /// One cadence tick: issue for every account whose interval elapsed.
    /// The background cadence loop runs this on a fixed interval; exposing
    /// it lets embedders and tests drive cadence deterministically.
    pub async fn run_cadence_check(&self) -> Result<usize, EngineError> {
        self.scheduler.periodic_cadence_check().await
    }

    /// One reaper tick: forget accounts silent past the inactivity
    /// threshold.
    pub async fn run_inactivity_reaper(&self) -> Result<usize, EngineError> {
        self.scheduler.reap_inactive().await
    }

    /// Forget an account's scheduling record and clean up after it.
    pub async fn remove_account(&self, owner: &str) -> Result<RemovalOutcome, EngineError> {
        let normalized = Owner::new(owner);
        let existed = self.scheduler.remove_account(&normalized).await?;
        let cleanup = self.run_owner_cleanup(owner).await?;
        Ok(RemovalOutcome { existed, cleanup })
    }

    /// Scheduling-state snapshot for reporting.
    pub async fn accounts(&self) -> Result<std::collections::BTreeMap<Owner, AccountRecord>, EngineError> {
        self.scheduler.accounts().await
    }

    /// Spawn the three periodic loops: global cleanup, cadence check, and
    /// inactivity reaping. The loops run until the returned registry is
    /// shut down or dropped.
    #[must_use]
    pub fn spawn_background_tasks(self: &Arc<Self>) -> EngineTasks {
        let tasks = EngineTasks::new();

        let engine = Arc::clone(self);
        tasks.spawn_interval(self.config.cleanup_interval, move || {
            let engine = Arc::clone(&engine);
            async move {
                // Failures are logged by the lifecycle manager and retried
                // on the next interval.
                let _ = engine.lifecycle.run_global_cleanup().await;
            }
        });

        let engine = Arc::clone(self);
        tasks.spawn_interval(self.config.cadence_check_interval, move || {
            let engine = Arc::clone(&engine);
            async move {
                if let Err(e) = engine.scheduler.periodic_cadence_check().await {
                    warn!(error = %e, "cadence check failed");
                }
            }
        });

        let engine = Arc::clone(self);
        tasks.spawn_interval(self.config.reap_interval, move || {
            let engine = Arc::clone(&engine);
            async move {
                if let Err(e) = engine.scheduler.reap_inactive().await {
                    warn!(error = %e, "inactivity reaper failed");
                }
            }
        });

        tasks
    }
}

/// Registry of the engine's background loops. Cooperative shutdown via a
/// watch channel; remaining handles are aborted on shutdown and on drop.
pub struct EngineTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: SyncMutex<Vec<JoinHandle<()>>>,
}

impl EngineTasks {
    fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: SyncMutex::new(Vec::new()),
        }
    }

    fn spawn_interval<F, Fut>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => tick().await,
                }
            }
        });
        self.handles.lock().push(handle);
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for EngineTasks {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}
