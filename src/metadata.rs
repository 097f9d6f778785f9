use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::StoreError;
use crate::picker::UriPicker;
use crate::store::StateStore;
use crate::types::TokenRange;

/// Identifier → URI map. Entries are created when their identifiers are
/// allocated and removed only by lifecycle sweeps; an entry must never
/// outlive its batch, and must never be deleted while its batch is valid.
pub struct MetadataRegistry {
    store: Arc<dyn StateStore>,
    writer: Mutex<()>,
}

impl MetadataRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
        }
    }

    /// Assign a URI to every identifier of a freshly allocated range, one
    /// picker call per identifier.
    pub async fn assign(&self, range: TokenRange, picker: &dyn UriPicker) -> Result<(), StoreError> {
        let _held = self.writer.lock().await;
        let mut map = self.store.load_metadata().await?;
        for id in range.ids() {
            map.insert(id, picker.pick_uri());
        }
        self.store.save_metadata(map).await
    }

    pub async fn get(&self, id: u64) -> Result<Option<String>, StoreError> {
        let map = self.store.load_metadata().await?;
        Ok(map.get(&id).cloned())
    }

    /// Keep exactly the entries whose identifiers are in `covered`; returns
    /// how many were removed.
    pub async fn retain(&self, covered: &BTreeSet<u64>) -> Result<usize, StoreError> {
        let _held = self.writer.lock().await;
        let mut map = self.store.load_metadata().await?;
        let before = map.len();
        map.retain(|id, _| covered.contains(id));
        let removed = before - map.len();
        if removed > 0 {
            self.store.save_metadata(map).await?;
        }
        Ok(removed)
    }

    /// Current number of entries.
    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.load_metadata().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picker::FixedPicker;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn assign_covers_whole_range() {
        let registry = MetadataRegistry::new(Arc::new(MemoryStore::new()));
        let picker = FixedPicker::new("ipfs://x");
        registry
            .assign(
                TokenRange {
                    start_id: 5,
                    count: 3,
                },
                &picker,
            )
            .await
            .unwrap();
        for id in 5..8 {
            assert_eq!(registry.get(id).await.unwrap().as_deref(), Some("ipfs://x"));
        }
        assert!(registry.get(8).await.unwrap().is_none());
        assert_eq!(registry.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn retain_drops_uncovered_ids() {
        let registry = MetadataRegistry::new(Arc::new(MemoryStore::new()));
        let picker = FixedPicker::new("ipfs://x");
        registry
            .assign(
                TokenRange {
                    start_id: 1,
                    count: 4,
                },
                &picker,
            )
            .await
            .unwrap();

        let covered: BTreeSet<u64> = [1u64, 2].into_iter().collect();
        let removed = registry.retain(&covered).await.unwrap();
        assert_eq!(removed, 2);
        assert!(registry.get(1).await.unwrap().is_some());
        assert!(registry.get(3).await.unwrap().is_none());
    }
}
