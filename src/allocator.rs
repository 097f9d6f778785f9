use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::{EngineError, StoreError};
use crate::store::StateStore;
use crate::types::TokenRange;

/// Hands out contiguous, non-overlapping identifier ranges. The guard is
/// held across the read-increment-write of the persisted counter, so
/// concurrent callers are linearized: no overlap, no reuse. A caller that
/// fails after allocating leaves a gap, which is acceptable; reuse is not.
pub struct IdAllocator {
    store: Arc<dyn StateStore>,
    guard: Mutex<()>,
}

impl IdAllocator {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Reserve the next `count` identifiers, starting at
    /// `last_allocated + 1`.
    pub async fn allocate(&self, count: u64) -> Result<TokenRange, EngineError> {
        if count == 0 {
            return Err(EngineError::InvalidCount(0));
        }
        let _held = self.guard.lock().await;
        let last = self
            .store
            .load_counter()
            .await
            .map_err(EngineError::Allocation)?;
        let end = last.checked_add(count).ok_or_else(|| {
            EngineError::Allocation(StoreError::Unavailable(
                "identifier space exhausted".into(),
            ))
        })?;
        self.store
            .save_counter(end)
            .await
            .map_err(EngineError::Allocation)?;
        Ok(TokenRange {
            start_id: last + 1,
            count,
        })
    }
}
