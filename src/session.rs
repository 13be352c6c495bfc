//! Game sessions and the session guard
//!
//! A session is one instance of a player playing one game. It is bound at
//! launch to the player and to the network origin the launch came from,
//! and it lives for a fixed window. [`SessionGuard`] is the predicate every
//! session-scoped operation passes through first.

use crate::common::types::{is_demo_token, TokenDigest, UserId};
use crate::errors::{WageringError, WageringResult};
use crate::repository::session_key;
use crate::unit_of_work::UnitOfWork;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token_digest: TokenDigest,
    pub user_id: UserId,
    pub game_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Origin recorded at launch; never changes afterwards
    pub origin: Option<String>,
    pub total_staked: Decimal,
    pub total_won: Decimal,
    pub round_count: u64,
    pub status: SessionStatus,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn open(
        token: &str,
        user_id: UserId,
        game_id: String,
        origin: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            token_digest: TokenDigest::of(token),
            user_id,
            game_id,
            created_at: now,
            expires_at: now + ttl,
            origin,
            total_staked: Decimal::ZERO,
            total_won: Decimal::ZERO,
            round_count: 0,
            status: SessionStatus::Active,
            ended_at: None,
        }
    }

    pub fn storage_key(&self) -> String {
        session_key(&self.token_digest)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Validates that a request may act on a session
///
/// Checks run in a fixed order: existence, ownership, lifecycle, origin.
/// The guard holds no state of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionGuard;

impl SessionGuard {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a live session for `caller`
    ///
    /// When the session is observed past its expiry for the first time the
    /// `ACTIVE -> EXPIRED` transition is staged into `uow` before
    /// `SessionExpired` is returned; the caller commits it.
    pub fn validate(
        &self,
        uow: &mut UnitOfWork,
        token: &str,
        caller: &UserId,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> WageringResult<Session> {
        if is_demo_token(token) {
            return Err(WageringError::SessionNotFound);
        }

        let key = session_key(&TokenDigest::of(token));
        let mut session: Session = uow.load(&key)?.ok_or(WageringError::SessionNotFound)?;

        if &session.user_id != caller {
            return Err(WageringError::SessionNotOwned);
        }

        match session.status {
            SessionStatus::Completed => return Err(WageringError::SessionClosed),
            SessionStatus::Expired => return Err(WageringError::SessionExpired),
            SessionStatus::Active if session.is_expired_at(now) => {
                session.status = SessionStatus::Expired;
                uow.stage(key, &session)?;
                info!(session = %session.token_digest, user = %session.user_id, "session expired");
                return Err(WageringError::SessionExpired);
            }
            SessionStatus::Active => {}
        }

        if let Some(recorded) = session.origin.as_deref() {
            if origin != Some(recorded) {
                return Err(WageringError::OriginMismatch);
            }
        }

        debug!(session = %session.token_digest, user = %caller, "session validated");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KvStore, MemoryStore};
    use crate::unit_of_work::TransactionManager;
    use std::sync::Arc;

    const TOKEN: &str = "token-abc";

    async fn setup(origin: Option<&str>) -> (TransactionManager, DateTime<Utc>) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let tm = TransactionManager::new(store);
        let now = Utc::now();
        let session = Session::open(
            TOKEN,
            UserId::new("alice"),
            "slots-3".to_string(),
            origin.map(str::to_string),
            now,
            Duration::hours(2),
        );
        let mut uow = tm.begin(&[session.storage_key()]).await;
        uow.stage(session.storage_key(), &session).unwrap();
        uow.commit().unwrap();
        (tm, now)
    }

    #[tokio::test]
    async fn test_valid_session_resolves() {
        let (tm, now) = setup(Some("10.0.0.1")).await;
        let mut uow = tm.begin(&[]).await;
        let session = SessionGuard::new()
            .validate(&mut uow, TOKEN, &UserId::new("alice"), Some("10.0.0.1"), now)
            .unwrap();
        assert_eq!(session.game_id, "slots-3");
    }

    #[tokio::test]
    async fn test_other_user_is_rejected_before_origin() {
        let (tm, now) = setup(Some("10.0.0.1")).await;
        let mut uow = tm.begin(&[]).await;
        let err = SessionGuard::new()
            .validate(&mut uow, TOKEN, &UserId::new("mallory"), Some("10.9.9.9"), now)
            .unwrap_err();
        assert!(matches!(err, WageringError::SessionNotOwned));
    }

    #[tokio::test]
    async fn test_origin_mismatch_and_missing_origin() {
        let (tm, now) = setup(Some("10.0.0.1")).await;
        let guard = SessionGuard::new();
        let alice = UserId::new("alice");

        let mut uow = tm.begin(&[]).await;
        let err = guard
            .validate(&mut uow, TOKEN, &alice, Some("10.0.0.2"), now)
            .unwrap_err();
        assert!(matches!(err, WageringError::OriginMismatch));

        let err = guard.validate(&mut uow, TOKEN, &alice, None, now).unwrap_err();
        assert!(matches!(err, WageringError::OriginMismatch));
    }

    #[tokio::test]
    async fn test_unbound_session_accepts_any_origin() {
        let (tm, now) = setup(None).await;
        let mut uow = tm.begin(&[]).await;
        assert!(SessionGuard::new()
            .validate(&mut uow, TOKEN, &UserId::new("alice"), Some("1.2.3.4"), now)
            .is_ok());
    }

    #[tokio::test]
    async fn test_lazy_expiry_is_staged() {
        let (tm, now) = setup(None).await;
        let later = now + Duration::hours(2) + Duration::seconds(1);
        let mut uow = tm.begin(&[]).await;
        let err = SessionGuard::new()
            .validate(&mut uow, TOKEN, &UserId::new("alice"), None, later)
            .unwrap_err();
        assert!(matches!(err, WageringError::SessionExpired));
        assert_eq!(uow.staged_len(), 1);

        let key = session_key(&TokenDigest::of(TOKEN));
        let staged: Session = uow.load(&key).unwrap().unwrap();
        assert_eq!(staged.status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_exclusive() {
        let (tm, now) = setup(None).await;
        let mut uow = tm.begin(&[]).await;
        assert!(SessionGuard::new()
            .validate(
                &mut uow,
                TOKEN,
                &UserId::new("alice"),
                None,
                now + Duration::hours(2)
            )
            .is_ok());
    }

    #[tokio::test]
    async fn test_demo_and_unknown_tokens_not_found() {
        let (tm, now) = setup(None).await;
        let mut uow = tm.begin(&[]).await;
        let guard = SessionGuard::new();
        let alice = UserId::new("alice");
        assert!(matches!(
            guard.validate(&mut uow, "demo-123", &alice, None, now),
            Err(WageringError::SessionNotFound)
        ));
        assert!(matches!(
            guard.validate(&mut uow, "nope", &alice, None, now),
            Err(WageringError::SessionNotFound)
        ));
    }
}
