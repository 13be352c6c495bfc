//! Atomic unit of work
//!
//! A [`UnitOfWork`] serializes access to the records it touches, stages
//! typed writes with read-your-writes semantics and commits them as a single
//! store batch. Dropping a unit without committing discards everything it
//! staged, so an error returned half way through a transition leaves no
//! trace in storage.
//!
//! Serialization uses a fixed table of striped async mutexes. Each record
//! key maps to a stripe; a unit locks its stripes in ascending order, which
//! rules out lock-order deadlocks between units touching overlapping keys.

use crate::errors::StorageError;
use crate::repository::{decode, encode};
use crate::storage::{BatchOp, KvStore};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

pub const DEFAULT_LOCK_STRIPES: usize = 1024;

/// Striped lock table keyed by record key
pub struct LockTable {
    stripes: Vec<Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new(stripes: usize) -> Self {
        let stripes = stripes.max(1);
        Self {
            stripes: (0..stripes).map(|_| Arc::new(Mutex::new(()))).collect(),
        }
    }

    fn stripe_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Lock every stripe covering `keys`, lowest index first
    pub async fn acquire(&self, keys: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut indices: Vec<usize> = keys.iter().map(|k| self.stripe_of(k)).collect();
        indices.sort_unstable();
        indices.dedup();

        let mut guards = Vec::with_capacity(indices.len());
        for idx in indices {
            guards.push(self.stripes[idx].clone().lock_owned().await);
        }
        guards
    }
}

/// Hands out units of work bound to one store and lock table
pub struct TransactionManager {
    store: Arc<dyn KvStore>,
    locks: LockTable,
}

impl TransactionManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_stripes(store, DEFAULT_LOCK_STRIPES)
    }

    pub fn with_stripes(store: Arc<dyn KvStore>, stripes: usize) -> Self {
        Self {
            store,
            locks: LockTable::new(stripes),
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Begin a unit holding the locks for `lock_keys` until commit or drop
    pub async fn begin(&self, lock_keys: &[String]) -> UnitOfWork {
        let guards = self.locks.acquire(lock_keys).await;
        UnitOfWork {
            store: self.store.clone(),
            staged: BTreeMap::new(),
            _guards: guards,
        }
    }
}

pub struct UnitOfWork {
    store: Arc<dyn KvStore>,
    staged: BTreeMap<String, Vec<u8>>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl UnitOfWork {
    /// Read a record, preferring a value staged in this unit
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        if let Some(bytes) = self.staged.get(key) {
            return Ok(Some(decode(key, bytes)?));
        }
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, key: &str) -> Result<bool, StorageError> {
        if self.staged.contains_key(key) {
            return Ok(true);
        }
        Ok(self.store.get(key)?.is_some())
    }

    pub fn stage<T: Serialize>(&mut self, key: String, value: &T) -> Result<(), StorageError> {
        let bytes = encode(&key, value)?;
        self.staged.insert(key, bytes);
        Ok(())
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Write what is staged so far in one batch, keeping the locks
    pub fn flush(&mut self) -> Result<usize, StorageError> {
        let count = self.staged.len();
        if count == 0 {
            return Ok(0);
        }
        let ops = std::mem::take(&mut self.staged)
            .into_iter()
            .map(|(key, value)| BatchOp::Put { key, value })
            .collect();
        self.store.write_batch(ops)?;
        debug!(records = count, "unit of work committed");
        Ok(count)
    }

    /// Write every staged record in one batch and release the locks
    pub fn commit(mut self) -> Result<usize, StorageError> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_staged_writes_are_invisible_until_commit() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let tm = TransactionManager::new(store.clone());

        let mut uow = tm.begin(&["k".to_string()]).await;
        uow.stage("k".to_string(), &42u32).unwrap();
        assert_eq!(uow.load::<u32>("k").unwrap(), Some(42));
        assert!(store.get("k").unwrap().is_none());

        uow.commit().unwrap();
        assert!(store.get("k").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_unit_discards_writes() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let tm = TransactionManager::new(store.clone());
        {
            let mut uow = tm.begin(&["k".to_string()]).await;
            uow.stage("k".to_string(), &1u32).unwrap();
        }
        assert!(store.get("k").unwrap().is_none());

        // Lock was released by the drop
        let uow = tm.begin(&["k".to_string()]).await;
        assert!(uow.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_units_are_serialized() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let tm = Arc::new(TransactionManager::with_stripes(store.clone(), 8));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let tm = tm.clone();
            handles.push(tokio::spawn(async move {
                let keys = vec!["a".to_string(), "b".to_string()];
                let mut uow = tm.begin(&keys).await;
                let current: u64 = uow.load("counter:a").unwrap().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(1)).await;
                uow.stage("counter:a".to_string(), &(current + 1)).unwrap();
                uow.commit().unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let uow = tm.begin(&["a".to_string()]).await;
        assert_eq!(uow.load::<u64>("counter:a").unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_reversed_key_order_does_not_deadlock() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let tm = Arc::new(TransactionManager::new(store));

        let t1 = {
            let tm = tm.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let uow = tm.begin(&["x".to_string(), "y".to_string()]).await;
                    drop(uow);
                }
            })
        };
        let t2 = {
            let tm = tm.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let uow = tm.begin(&["y".to_string(), "x".to_string()]).await;
                    drop(uow);
                }
            })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            t1.await.unwrap();
            t2.await.unwrap();
        })
        .await
        .expect("lock ordering deadlocked");
    }
}
