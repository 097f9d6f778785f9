use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::StoreError;
use crate::store::StateStore;
use crate::types::{Batch, Owner};

/// Authoritative record of committed batches. Every mutation holds the one
/// writer lock across its read-modify-write, so an append landing during a
/// sweep's partition is never lost and readers only ever observe whole
/// snapshots.
pub struct BatchStore {
    store: Arc<dyn StateStore>,
    writer: Mutex<()>,
}

impl BatchStore {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
        }
    }

    /// Durably record a new batch.
    pub async fn append(&self, batch: Batch) -> Result<(), StoreError> {
        let _held = self.writer.lock().await;
        let mut all = self.store.load_batches().await?;
        all.push(batch);
        self.store.save_batches(all).await
    }

    pub async fn list_all(&self) -> Result<Vec<Batch>, StoreError> {
        self.store.load_batches().await
    }

    pub async fn list_by_owner(&self, owner: &Owner) -> Result<Vec<Batch>, StoreError> {
        let all = self.store.load_batches().await?;
        Ok(all.into_iter().filter(|b| &b.owner == owner).collect())
    }

    /// The batch whose range contains `id` for the given owner, if any.
    pub async fn find_owning(&self, owner: &Owner, id: u64) -> Result<Option<Batch>, StoreError> {
        let all = self.store.load_batches().await?;
        Ok(all
            .into_iter()
            .find(|b| &b.owner == owner && b.range.contains(id)))
    }

    /// Atomically swap the full collection. Serialized against `append`.
    pub async fn replace_all(&self, survivors: Vec<Batch>) -> Result<(), StoreError> {
        let _held = self.writer.lock().await;
        self.store.save_batches(survivors).await
    }

    /// Partition under the writer lock: keep batches matching `keep`, write
    /// the survivors back, and return the removed records. Holding the lock
    /// across read and write is what keeps a concurrent append from being
    /// lost between the sweep's read and its write.
    pub async fn sweep<F>(&self, keep: F) -> Result<Vec<Batch>, StoreError>
    where
        F: Fn(&Batch) -> bool + Send,
    {
        let _held = self.writer.lock().await;
        let all = self.store.load_batches().await?;
        let (kept, removed): (Vec<Batch>, Vec<Batch>) = all.into_iter().partition(|b| keep(b));
        if removed.is_empty() {
            return Ok(removed);
        }
        self.store.save_batches(kept).await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::TokenRange;

    fn batch(owner: &str, start_id: u64, count: u64) -> Batch {
        Batch {
            owner: Owner::new(owner),
            range: TokenRange { start_id, count },
            root: [0u8; 32],
            committed_at: 1,
            ledger_seq: 0,
        }
    }

    #[tokio::test]
    async fn find_owning_respects_owner_and_range() {
        let batches = BatchStore::new(Arc::new(MemoryStore::new()));
        batches.append(batch("alice", 1, 10)).await.unwrap();
        batches.append(batch("bob", 11, 10)).await.unwrap();

        let alice = Owner::new("alice");
        let bob = Owner::new("bob");
        assert!(batches.find_owning(&alice, 5).await.unwrap().is_some());
        assert!(batches.find_owning(&alice, 15).await.unwrap().is_none());
        assert!(batches.find_owning(&bob, 15).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_returns_removed_and_keeps_rest() {
        let batches = BatchStore::new(Arc::new(MemoryStore::new()));
        batches.append(batch("alice", 1, 10)).await.unwrap();
        batches.append(batch("bob", 11, 10)).await.unwrap();

        let removed = batches
            .sweep(|b| b.owner == Owner::new("alice"))
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].owner, Owner::new("bob"));
        let left = batches.list_all().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].owner, Owner::new("alice"));
    }
}
