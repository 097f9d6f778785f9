use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::engine::Issuer;
use crate::errors::EngineError;
use crate::store::StateStore;
use crate::types::{AccountRecord, ActivityKind, ActivityOutcome, Batch, Owner};

/// Per-account cadence state machine: `Unknown → Active → (inactive by
/// time) → removed`. Issuance fires on transitions *into* activity (first
/// signal, return from inactivity) and on the periodic cadence, never on
/// every heartbeat, so polling bursts cannot trigger duplicate issuance.
pub struct CadenceScheduler {
    store: Arc<dyn StateStore>,
    issuer: Arc<Issuer>,
    clock: Arc<dyn Clock>,
    mint_interval: u64,
    inactivity_threshold: u64,
    accounts_writer: Mutex<()>,
    issuance_locks: SyncMutex<HashMap<Owner, Arc<Mutex<()>>>>,
}

impl CadenceScheduler {
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        issuer: Arc<Issuer>,
        clock: Arc<dyn Clock>,
        mint_interval: u64,
        inactivity_threshold: u64,
    ) -> Self {
        Self {
            store,
            issuer,
            clock,
            mint_interval,
            inactivity_threshold,
            accounts_writer: Mutex::new(()),
            issuance_locks: SyncMutex::new(HashMap::new()),
        }
    }

    /// Record an activity signal and, on a transition into activity, issue
    /// a batch for the account. `last_active_at` is always refreshed;
    /// `last_issued_at` moves only when issuance succeeds, so a failure is
    /// retried by the next cadence tick instead of silently skipping an
    /// interval.
    pub async fn on_activity(&self, owner: &Owner) -> Result<ActivityOutcome, EngineError> {
        let now = self.clock.now();
        let kind = {
            let _held = self.accounts_writer.lock().await;
            let mut accounts = self.store.load_accounts().await?;
            let kind = match accounts.get(owner) {
                None => ActivityKind::First,
                Some(rec)
                    if now.saturating_sub(rec.last_active_at) > self.inactivity_threshold =>
                {
                    ActivityKind::Returning
                }
                Some(_) => ActivityKind::Heartbeat,
            };
            let entry = accounts.entry(owner.clone()).or_insert(AccountRecord {
                last_active_at: now,
                last_issued_at: 0,
            });
            entry.last_active_at = now;
            self.store.save_accounts(accounts).await?;
            kind
        };

        if kind == ActivityKind::Heartbeat {
            return Ok(ActivityOutcome { kind, issued: None });
        }
        let batch = self.issue_serialized(owner).await?;
        Ok(ActivityOutcome {
            kind,
            issued: Some(batch),
        })
    }

    /// Walk a snapshot of known accounts and issue for every one whose
    /// cadence interval has elapsed. Accounts are processed concurrently;
    /// per-owner locks keep any single account's issuance serialized with
    /// activity-triggered issuance. Returns how many batches were issued.
    pub async fn periodic_cadence_check(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let snapshot = self.store.load_accounts().await?;
        let due: Vec<Owner> = snapshot
            .iter()
            .filter(|(_, rec)| now.saturating_sub(rec.last_issued_at) >= self.mint_interval)
            .map(|(owner, _)| owner.clone())
            .collect();

        let results = join_all(due.iter().map(|owner| self.issue_if_due(owner))).await;
        let mut issued = 0usize;
        for (owner, result) in due.iter().zip(results) {
            match result {
                Ok(true) => issued += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(owner = %owner, error = %e, "cadence issuance failed; retrying next tick");
                }
            }
        }
        Ok(issued)
    }

    /// Delete records of accounts silent for longer than the inactivity
    /// threshold. Their batches are left to the lifecycle sweeps.
    pub async fn reap_inactive(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let _held = self.accounts_writer.lock().await;
        let mut accounts = self.store.load_accounts().await?;
        let stale: Vec<Owner> = accounts
            .iter()
            .filter(|(_, rec)| now.saturating_sub(rec.last_active_at) > self.inactivity_threshold)
            .map(|(owner, _)| owner.clone())
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        for owner in &stale {
            accounts.remove(owner);
        }
        self.store.save_accounts(accounts).await?;
        {
            let mut locks = self.issuance_locks.lock();
            for owner in &stale {
                locks.remove(owner);
            }
        }
        info!(count = stale.len(), "inactive accounts reaped");
        Ok(stale.len())
    }

    /// Explicitly forget one account. Returns whether a record existed.
    pub async fn remove_account(&self, owner: &Owner) -> Result<bool, EngineError> {
        let _held = self.accounts_writer.lock().await;
        let mut accounts = self.store.load_accounts().await?;
        let existed = accounts.remove(owner).is_some();
        if existed {
            self.store.save_accounts(accounts).await?;
        }
        self.issuance_locks.lock().remove(owner);
        Ok(existed)
    }

    /// Read-only snapshot for reporting.
    pub async fn accounts(&self) -> Result<BTreeMap<Owner, AccountRecord>, EngineError> {
        Ok(self.store.load_accounts().await?)
    }

    fn owner_lock(&self, owner: &Owner) -> Arc<Mutex<()>> {
        self.issuance_locks
            .lock()
            .entry(owner.clone())
            .or_default()
            .clone()
    }

    /// Activity-transition issuance: always due, but serialized per owner
    /// against the cadence path.
    async fn issue_serialized(&self, owner: &Owner) -> Result<Batch, EngineError> {
        let lock = self.owner_lock(owner);
        let _held = lock.lock().await;
        let batch = self.issuer.issue_for(owner).await?;
        self.mark_issued(owner).await?;
        Ok(batch)
    }

    /// Cadence-path issuance. Due-ness is re-checked under the per-owner
    /// lock: an activity-triggered issuance may have landed after the tick's
    /// snapshot was taken, and issuing again would double-allocate for the
    /// interval.
    async fn issue_if_due(&self, owner: &Owner) -> Result<bool, EngineError> {
        let lock = self.owner_lock(owner);
        let _held = lock.lock().await;
        let accounts = self.store.load_accounts().await?;
        let Some(record) = accounts.get(owner) else {
            // Reaped since the snapshot.
            return Ok(false);
        };
        let now = self.clock.now();
        if now.saturating_sub(record.last_issued_at) < self.mint_interval {
            return Ok(false);
        }
        self.issuer.issue_for(owner).await?;
        self.mark_issued(owner).await?;
        Ok(true)
    }

    async fn mark_issued(&self, owner: &Owner) -> Result<(), EngineError> {
        let _held = self.accounts_writer.lock().await;
        let mut accounts = self.store.load_accounts().await?;
        if let Some(record) = accounts.get_mut(owner) {
            record.last_issued_at = self.clock.now();
            self.store.save_accounts(accounts).await?;
        }
        Ok(())
    }
}
