use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::StoreError;
use crate::types::{AccountRecord, Batch, Owner};

/// Key-partitioned durable storage seam: collection-granular get/set for the
/// four logical collections. Each save replaces its collection atomically
/// with respect to loads; compound read-modify-write atomicity is the
/// engine's responsibility (single-writer locks above this trait).
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_counter(&self) -> Result<u64, StoreError>;
    async fn save_counter(&self, value: u64) -> Result<(), StoreError>;

    async fn load_batches(&self) -> Result<Vec<Batch>, StoreError>;
    async fn save_batches(&self, batches: Vec<Batch>) -> Result<(), StoreError>;

    async fn load_metadata(&self) -> Result<BTreeMap<u64, String>, StoreError>;
    async fn save_metadata(&self, map: BTreeMap<u64, String>) -> Result<(), StoreError>;

    async fn load_accounts(&self) -> Result<BTreeMap<Owner, AccountRecord>, StoreError>;
    async fn save_accounts(&self, map: BTreeMap<Owner, AccountRecord>) -> Result<(), StoreError>;
}

/// In-process store. Collections sit behind `parking_lot` locks that are
/// never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counter: RwLock<u64>,
    batches: RwLock<Vec<Batch>>,
    metadata: RwLock<BTreeMap<u64, String>>,
    accounts: RwLock<BTreeMap<Owner, AccountRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_counter(&self) -> Result<u64, StoreError> {
        Ok(*self.counter.read())
    }

    async fn save_counter(&self, value: u64) -> Result<(), StoreError> {
        *self.counter.write() = value;
        Ok(())
    }

    async fn load_batches(&self) -> Result<Vec<Batch>, StoreError> {
        Ok(self.batches.read().clone())
    }

    async fn save_batches(&self, batches: Vec<Batch>) -> Result<(), StoreError> {
        *self.batches.write() = batches;
        Ok(())
    }

    async fn load_metadata(&self) -> Result<BTreeMap<u64, String>, StoreError> {
        Ok(self.metadata.read().clone())
    }

    async fn save_metadata(&self, map: BTreeMap<u64, String>) -> Result<(), StoreError> {
        *self.metadata.write() = map;
        Ok(())
    }

    async fn load_accounts(&self) -> Result<BTreeMap<Owner, AccountRecord>, StoreError> {
        Ok(self.accounts.read().clone())
    }

    async fn save_accounts(&self, map: BTreeMap<Owner, AccountRecord>) -> Result<(), StoreError> {
        *self.accounts.write() = map;
        Ok(())
    }
}

/// Flat-file store: one JSON snapshot per collection under a directory.
/// Saves write a sibling temp file and rename over the target, so readers
/// never observe a partially written collection.
#[derive(Debug)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    async fn load_collection<T>(&self, name: &str, empty: T) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let path = self.path(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(empty),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn save_collection<T>(&self, name: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        let bytes =
            serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let target = self.path(name);
        let tmp = self.dir.join(format!("{name}.json.tmp"));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    /// Directory holding the collection snapshots.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl StateStore for JsonStore {
    async fn load_counter(&self) -> Result<u64, StoreError> {
        self.load_collection("counter", 0).await
    }

    async fn save_counter(&self, value: u64) -> Result<(), StoreError> {
        self.save_collection("counter", &value).await
    }

    async fn load_batches(&self) -> Result<Vec<Batch>, StoreError> {
        self.load_collection("batches", Vec::new()).await
    }

    async fn save_batches(&self, batches: Vec<Batch>) -> Result<(), StoreError> {
        self.save_collection("batches", &batches).await
    }

    async fn load_metadata(&self) -> Result<BTreeMap<u64, String>, StoreError> {
        self.load_collection("metadata", BTreeMap::new()).await
    }

    async fn save_metadata(&self, map: BTreeMap<u64, String>) -> Result<(), StoreError> {
        self.save_collection("metadata", &map).await
    }

    async fn load_accounts(&self) -> Result<BTreeMap<Owner, AccountRecord>, StoreError> {
        self.load_collection("accounts", BTreeMap::new()).await
    }

    async fn save_accounts(&self, map: BTreeMap<Owner, AccountRecord>) -> Result<(), StoreError> {
        self.save_collection("accounts", &map).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenRange;

    fn sample_batch() -> Batch {
        Batch {
            owner: Owner::new("alice"),
            range: TokenRange {
                start_id: 1,
                count: 3,
            },
            root: [7u8; 32],
            committed_at: 1_000,
            ledger_seq: 0,
        }
    }

    #[tokio::test]
    async fn memory_store_round_trips_collections() {
        let store = MemoryStore::new();
        assert_eq!(store.load_counter().await.unwrap(), 0);
        store.save_counter(42).await.unwrap();
        assert_eq!(store.load_counter().await.unwrap(), 42);

        store.save_batches(vec![sample_batch()]).await.unwrap();
        assert_eq!(store.load_batches().await.unwrap(), vec![sample_batch()]);
    }

    #[tokio::test]
    async fn json_store_round_trips_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();

        store.save_counter(9).await.unwrap();
        store.save_batches(vec![sample_batch()]).await.unwrap();
        let mut meta = BTreeMap::new();
        meta.insert(1u64, "ipfs://a".to_string());
        store.save_metadata(meta.clone()).await.unwrap();
        let mut accounts = BTreeMap::new();
        accounts.insert(
            Owner::new("bob"),
            AccountRecord {
                last_active_at: 5,
                last_issued_at: 0,
            },
        );
        store.save_accounts(accounts.clone()).await.unwrap();

        // Reopen from the same directory: everything survives.
        let reopened = JsonStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_counter().await.unwrap(), 9);
        assert_eq!(reopened.load_batches().await.unwrap(), vec![sample_batch()]);
        assert_eq!(reopened.load_metadata().await.unwrap(), meta);
        assert_eq!(reopened.load_accounts().await.unwrap(), accounts);
    }

    #[tokio::test]
    async fn json_store_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        assert_eq!(store.load_counter().await.unwrap(), 0);
        assert!(store.load_batches().await.unwrap().is_empty());
        assert!(store.load_metadata().await.unwrap().is_empty());
        assert!(store.load_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn legacy_batch_without_committed_at_deserializes_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        let legacy = r#"[{
            "owner": "carol",
            "range": { "start_id": 1, "count": 2 },
            "root": [0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0],
            "ledger_seq": 3
        }]"#;
        std::fs::write(store.dir().join("batches.json"), legacy).unwrap();
        let batches = store.load_batches().await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].committed_at, 0);
        assert_eq!(batches[0].ledger_seq, 3);
    }
}
