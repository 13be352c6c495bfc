//! Key/value storage backends
//!
//! Every durable record of the wagering core lives behind [`KvStore`]. The
//! one guarantee the rest of the crate relies on is that a batch passed to
//! [`KvStore::write_batch`] becomes visible completely or not at all.

use crate::errors::StorageError;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// One write inside an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: String, value: Vec<u8> },
}

/// Minimal ordered key/value interface
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

    /// Apply every op atomically
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError>;
}

/// In-process store, used by tests and the `--memory` server mode
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self
            .data
            .read()
            .map_err(|_| StorageError::ReadFailed("memory store lock poisoned".to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let data = self
            .data
            .read()
            .map_err(|_| StorageError::ReadFailed("memory store lock poisoned".to_string()))?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        // Single write lock for the whole batch gives all-or-nothing visibility
        let mut data = self
            .data
            .write()
            .map_err(|_| StorageError::WriteFailed("memory store lock poisoned".to_string()))?;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::{BatchOp, KvStore};
    use crate::errors::StorageError;
    use rocksdb::{Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
    use std::path::Path;
    use std::sync::Arc;

    /// RocksDB-backed durable store
    #[derive(Clone)]
    pub struct RocksStore {
        db: Arc<DB>,
    }

    impl RocksStore {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            opts.set_write_buffer_size(64 * 1024 * 1024);
            opts.set_max_write_buffer_number(4);
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

            let db = DB::open(&opts, path).map_err(|e| StorageError::OpenFailed(e.to_string()))?;
            Ok(Self { db: Arc::new(db) })
        }
    }

    impl KvStore for RocksStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.db
                .get(key.as_bytes())
                .map_err(|e| StorageError::ReadFailed(e.to_string()))
        }

        fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
            let mut out = Vec::new();
            let iter = self
                .db
                .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
            for item in iter {
                let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
                if !key.starts_with(prefix.as_bytes()) {
                    break;
                }
                let key = String::from_utf8(key.to_vec()).map_err(|e| StorageError::CorruptedData {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    reason: e.to_string(),
                })?;
                out.push((key, value.to_vec()));
            }
            Ok(out)
        }

        fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
            let mut batch = WriteBatch::default();
            for op in &ops {
                match op {
                    BatchOp::Put { key, value } => batch.put(key.as_bytes(), value),
                }
            }
            // Money movements must survive a crash once acknowledged
            let mut write_opts = WriteOptions::default();
            write_opts.set_sync(true);
            self.db.write_opt(batch, &write_opts)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, value: &str) -> BatchOp {
        BatchOp::Put {
            key: key.to_string(),
            value: value.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_memory_store_batch_and_get() {
        let store = MemoryStore::new();
        store
            .write_batch(vec![put("user:a", "1"), put("user:b", "2")])
            .unwrap();
        assert_eq!(store.get("user:a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("user:c").unwrap(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        store
            .write_batch(vec![
                put("ledger:u1:0002", "b"),
                put("ledger:u1:0001", "a"),
                put("ledger:u2:0001", "x"),
                put("round:r1", "r"),
            ])
            .unwrap();

        let entries = store.scan_prefix("ledger:u1:").unwrap();
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["ledger:u1:0001", "ledger:u1:0002"]);
    }
}
