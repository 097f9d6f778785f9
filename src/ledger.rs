use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use veilmint_primitives::Hash256;

use crate::clock::Clock;
use crate::errors::LedgerError;

/// Confirmation returned once a root is finalized on the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerConfirmation {
    /// Position of the root in the ledger's committed-root history.
    pub sequence: u64,
    /// Ledger acceptance time, seconds.
    pub committed_at: u64,
}

/// Ledger contract seam. Commit is all-or-nothing: the engine records no
/// batch unless `commit_root` returned a confirmation.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a batch root; returns once finalized or errors.
    async fn commit_root(&self, root: Hash256) -> Result<LedgerConfirmation, LedgerError>;

    /// On-chain reveal threshold fallback, seconds.
    async fn reveal_threshold(&self) -> Result<u64, LedgerError>;
}

/// In-process ledger double: records committed roots in order and supports
/// scripted failures and commit latency.
pub struct MockLedger {
    clock: Arc<dyn Clock>,
    roots: parking_lot::Mutex<Vec<Hash256>>,
    threshold: AtomicU64,
    fail_commits: AtomicBool,
    commit_delay: parking_lot::Mutex<Duration>,
}

impl MockLedger {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, threshold: u64) -> Self {
        Self {
            clock,
            roots: parking_lot::Mutex::new(Vec::new()),
            threshold: AtomicU64::new(threshold),
            fail_commits: AtomicBool::new(false),
            commit_delay: parking_lot::Mutex::new(Duration::ZERO),
        }
    }

    /// Roots in commit order.
    #[must_use]
    pub fn committed_roots(&self) -> Vec<Hash256> {
        self.roots.lock().clone()
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn set_commit_delay(&self, delay: Duration) {
        *self.commit_delay.lock() = delay;
    }

    pub fn set_threshold(&self, threshold: u64) {
        self.threshold.store(threshold, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn commit_root(&self, root: Hash256) -> Result<LedgerConfirmation, LedgerError> {
        let delay = *self.commit_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("scripted failure".into()));
        }
        let mut roots = self.roots.lock();
        roots.push(root);
        Ok(LedgerConfirmation {
            sequence: roots.len() as u64 - 1,
            committed_at: self.clock.now(),
        })
    }

    async fn reveal_threshold(&self) -> Result<u64, LedgerError> {
        Ok(self.threshold.load(Ordering::SeqCst))
    }
}
