//! Typed repositories over the key/value store
//!
//! Records are stored as JSON under namespaced keys:
//!
//! | Prefix      | Record                                   |
//! |-------------|------------------------------------------|
//! | `user:`     | [`UserAccount`] by user id               |
//! | `session:`  | [`Session`] by SHA-256 digest of token   |
//! | `round:`    | [`Round`] by idempotency key             |
//! | `ledger:`   | [`LedgerEntry`] by hex user id and seq   |
//! | `audit:`    | [`SecurityEvent`] by time and event id   |
//!
//! The read side here takes no locks. Anything that mutates goes through a
//! [`UnitOfWork`](crate::unit_of_work::UnitOfWork).

use crate::audit::SecurityEvent;
use crate::common::types::{RoundId, TokenDigest, UserId};
use crate::errors::StorageError;
use crate::ledger::{LedgerEntry, UserAccount};
use crate::rounds::Round;
use crate::session::Session;
use crate::storage::KvStore;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

pub const USER_PREFIX: &str = "user:";
pub const SESSION_PREFIX: &str = "session:";
pub const ROUND_PREFIX: &str = "round:";
pub const LEDGER_PREFIX: &str = "ledger:";
pub const AUDIT_PREFIX: &str = "audit:";

pub fn user_key(user_id: &UserId) -> String {
    format!("{}{}", USER_PREFIX, user_id)
}

pub fn session_key(digest: &TokenDigest) -> String {
    format!("{}{}", SESSION_PREFIX, digest.as_str())
}

pub fn round_key(round_id: &RoundId) -> String {
    format!("{}{}", ROUND_PREFIX, round_id)
}

/// User ids may contain the `:` separator, so the scanned segment is hex
pub fn ledger_prefix(user_id: &UserId) -> String {
    format!("{}{}:", LEDGER_PREFIX, hex::encode(user_id.as_str()))
}

/// Zero-padded sequence keeps ledger entries in append order under a prefix scan
pub fn ledger_key(user_id: &UserId, seq: u64) -> String {
    format!("{}{:020}", ledger_prefix(user_id), seq)
}

pub fn audit_key(event: &SecurityEvent) -> String {
    format!(
        "{}{:020}:{}",
        AUDIT_PREFIX,
        event.at.timestamp_micros().max(0),
        event.event_id
    )
}

pub fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::CorruptedData {
        key: key.to_string(),
        reason: format!("serialization failed: {}", e),
    })
}

pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::CorruptedData {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Read-only access to committed records
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn KvStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn account(&self, user_id: &UserId) -> Result<Option<UserAccount>, StorageError> {
        self.load(&user_key(user_id))
    }

    pub fn session(&self, digest: &TokenDigest) -> Result<Option<Session>, StorageError> {
        self.load(&session_key(digest))
    }

    pub fn round(&self, round_id: &RoundId) -> Result<Option<Round>, StorageError> {
        self.load(&round_key(round_id))
    }

    /// Ledger entries for a user, oldest first
    pub fn ledger_entries(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, StorageError> {
        self.store
            .scan_prefix(&ledger_prefix(user_id))?
            .into_iter()
            .map(|(key, bytes)| decode(&key, &bytes))
            .collect()
    }

    /// Most recent `limit` ledger entries, newest first
    pub fn recent_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StorageError> {
        let mut entries = self.ledger_entries(user_id)?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    pub fn audit_events(&self) -> Result<Vec<SecurityEvent>, StorageError> {
        self.store
            .scan_prefix(AUDIT_PREFIX)?
            .into_iter()
            .map(|(key, bytes)| decode(&key, &bytes))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_keys_sort_by_sequence() {
        let user = UserId::new("u1");
        let k9 = ledger_key(&user, 9);
        let k10 = ledger_key(&user, 10);
        assert!(k9 < k10);
        assert!(k10.starts_with(&ledger_prefix(&user)));
    }

    #[test]
    fn test_ledger_prefix_does_not_overlap_similar_ids() {
        // "u1:" must not match entries of "u10"
        let a = ledger_prefix(&UserId::new("u1"));
        let b = ledger_key(&UserId::new("u10"), 1);
        assert!(!b.starts_with(&a));
    }

    #[test]
    fn test_ledger_prefix_isolates_ids_containing_separator() {
        let a = ledger_prefix(&UserId::new("a"));
        let nested = ledger_key(&UserId::new("a:b"), 0);
        assert!(!nested.starts_with(&a));
    }

    #[tokio::test]
    async fn test_ledger_entries_scoped_to_exact_user() {
        use crate::common::types::RoundId;
        use crate::config::WageringConfig;
        use crate::ledger::replay_balance;
        use crate::service::WageringService;
        use crate::storage::MemoryStore;
        use rust_decimal_macros::dec;

        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let service = WageringService::builder(WageringConfig::testing(), store.clone())
            .build()
            .unwrap();
        let a = UserId::new("a");
        let nested = UserId::new("a:b");
        service.register_account(&a, dec!(100.00)).await.unwrap();
        service.register_account(&nested, dec!(100.00)).await.unwrap();

        let token = service
            .launch_session(&nested, "classic-fruits", false, None)
            .await
            .unwrap()
            .session_token;
        service
            .place_bet(&nested, &token, &RoundId::new("r-1"), dec!(10.00), None)
            .await
            .unwrap();

        let repo = Repository::new(store);
        let entries_a = repo.ledger_entries(&a).unwrap();
        assert!(entries_a.is_empty());
        assert_eq!(replay_balance(dec!(100.00), &entries_a), dec!(100.00));
        assert!(service.ledger(&a, 100).unwrap().is_empty());

        let entries_nested = repo.ledger_entries(&nested).unwrap();
        assert_eq!(entries_nested.len(), 1);
        assert_eq!(replay_balance(dec!(100.00), &entries_nested), dec!(90.00));
    }

    #[test]
    fn test_decode_reports_key_on_corruption() {
        let err = decode::<UserAccount>("user:x", b"not json").unwrap_err();
        match err {
            StorageError::CorruptedData { key, .. } => assert_eq!(key, "user:x"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
