//! Balance ledger
//!
//! Owns the spendable balance of each account and its append-only trail of
//! money movements. A balance change and its [`LedgerEntry`] are always
//! staged into the same unit of work, so neither is ever observable without
//! the other.

use crate::common::types::{scale_money, RoundId, UserId};
use crate::errors::{WageringError, WageringResult};
use crate::repository::{ledger_key, user_key};
use crate::unit_of_work::UnitOfWork;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

/// Player account as seen by the wagering core
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    pub balance: Decimal,
    pub status: AccountStatus,
    #[serde(default)]
    pub self_exclusion_until: Option<DateTime<Utc>>,
    /// Sequence number of the next ledger entry
    #[serde(default)]
    pub ledger_seq: u64,
}

impl UserAccount {
    pub fn new(user_id: UserId, balance: Decimal) -> Self {
        Self {
            user_id,
            balance: scale_money(balance),
            status: AccountStatus::Active,
            self_exclusion_until: None,
            ledger_seq: 0,
        }
    }

    pub fn is_self_excluded(&self, now: DateTime<Utc>) -> bool {
        self.self_exclusion_until.map_or(false, |until| until > now)
    }
}

/// Kind of balance movement produced by a round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Bet,
    Win,
    Refund,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Bet => "BET",
            MovementKind::Win => "WIN",
            MovementKind::Refund => "REFUND",
        }
    }
}

/// Immutable record of one balance movement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub user_id: UserId,
    pub seq: u64,
    pub kind: MovementKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub round_id: RoundId,
    pub created_at: DateTime<Utc>,
}

/// Stateless ledger operations over a unit of work
#[derive(Debug, Default, Clone, Copy)]
pub struct BalanceLedger;

impl BalanceLedger {
    pub fn new() -> Self {
        Self
    }

    /// Adjust a balance and append the paired ledger entry
    ///
    /// `BET` requires `balance >= amount`; `WIN` and `REFUND` have no
    /// balance precondition. The amount must be strictly positive. Returns
    /// the appended entry, whose `balance_after` is the new balance.
    pub fn apply_movement(
        &self,
        uow: &mut UnitOfWork,
        user_id: &UserId,
        kind: MovementKind,
        amount: Decimal,
        round_id: &RoundId,
        now: DateTime<Utc>,
    ) -> WageringResult<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(WageringError::InvalidAmount {
                amount,
                reason: format!("{} amount must be positive", kind.as_str()),
            });
        }

        let key = user_key(user_id);
        let mut account: UserAccount = uow
            .load(&key)?
            .ok_or_else(|| WageringError::AccountNotFound(user_id.to_string()))?;

        let balance_before = account.balance;
        let balance_after = match kind {
            MovementKind::Bet => {
                if balance_before < amount {
                    return Err(WageringError::InsufficientFunds {
                        balance: balance_before,
                        required: amount,
                    });
                }
                balance_before - amount
            }
            MovementKind::Win | MovementKind::Refund => balance_before + amount,
        };

        let entry = LedgerEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            seq: account.ledger_seq,
            kind,
            amount: scale_money(amount),
            balance_before: scale_money(balance_before),
            balance_after: scale_money(balance_after),
            round_id: round_id.clone(),
            created_at: now,
        };

        account.balance = entry.balance_after;
        account.ledger_seq += 1;

        uow.stage(ledger_key(user_id, entry.seq), &entry)?;
        uow.stage(key, &account)?;

        debug!(
            user = %user_id,
            round = %round_id,
            kind = kind.as_str(),
            amount = %entry.amount,
            balance = %entry.balance_after,
            "balance movement staged"
        );

        Ok(entry)
    }
}

/// Replay ledger entries from an opening balance
pub fn replay_balance(opening: Decimal, entries: &[LedgerEntry]) -> Decimal {
    entries.iter().fold(opening, |balance, entry| match entry.kind {
        MovementKind::Bet => balance - entry.amount,
        MovementKind::Win | MovementKind::Refund => balance + entry.amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;
    use crate::storage::{KvStore, MemoryStore};
    use crate::unit_of_work::TransactionManager;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn setup(balance: Decimal) -> (TransactionManager, Repository, UserId) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let tm = TransactionManager::new(store.clone());
        let user = UserId::new("player-1");
        let mut uow = tm.begin(&[user_key(&user)]).await;
        uow.stage(user_key(&user), &UserAccount::new(user.clone(), balance))
            .unwrap();
        uow.commit().unwrap();
        (tm, Repository::new(store), user)
    }

    #[tokio::test]
    async fn test_bet_debits_and_records_entry() {
        let (tm, repo, user) = setup(dec!(100.00)).await;
        let ledger = BalanceLedger::new();
        let round = RoundId::new("r-1");

        let mut uow = tm.begin(&[user_key(&user)]).await;
        let entry = ledger
            .apply_movement(&mut uow, &user, MovementKind::Bet, dec!(10.00), &round, Utc::now())
            .unwrap();
        uow.commit().unwrap();

        assert_eq!(entry.balance_before, dec!(100.00));
        assert_eq!(entry.balance_after, dec!(90.00));
        assert_eq!(repo.account(&user).unwrap().unwrap().balance, dec!(90.00));
        let entries = repo.ledger_entries(&user).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, MovementKind::Bet);
    }

    #[tokio::test]
    async fn test_bet_exceeding_balance_is_rejected() {
        let (tm, repo, user) = setup(dec!(5.00)).await;
        let ledger = BalanceLedger::new();

        let mut uow = tm.begin(&[user_key(&user)]).await;
        let err = ledger
            .apply_movement(
                &mut uow,
                &user,
                MovementKind::Bet,
                dec!(5.01),
                &RoundId::new("r-1"),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, WageringError::InsufficientFunds { .. }));
        assert!(uow.is_empty());
        drop(uow);

        assert_eq!(repo.account(&user).unwrap().unwrap().balance, dec!(5.00));
        assert!(repo.ledger_entries(&user).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exact_balance_bet_is_allowed() {
        let (tm, _repo, user) = setup(dec!(5.00)).await;
        let mut uow = tm.begin(&[user_key(&user)]).await;
        let entry = BalanceLedger::new()
            .apply_movement(
                &mut uow,
                &user,
                MovementKind::Bet,
                dec!(5.00),
                &RoundId::new("r-1"),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(entry.balance_after, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_replay_matches_balance() {
        let (tm, repo, user) = setup(dec!(50.00)).await;
        let ledger = BalanceLedger::new();
        let round = RoundId::new("r-1");

        let mut uow = tm.begin(&[user_key(&user)]).await;
        ledger
            .apply_movement(&mut uow, &user, MovementKind::Bet, dec!(20.00), &round, Utc::now())
            .unwrap();
        ledger
            .apply_movement(&mut uow, &user, MovementKind::Win, dec!(35.50), &round, Utc::now())
            .unwrap();
        uow.commit().unwrap();

        let entries = repo.ledger_entries(&user).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 0);
        assert_eq!(entries[1].seq, 1);
        let balance = repo.account(&user).unwrap().unwrap().balance;
        assert_eq!(replay_balance(dec!(50.00), &entries), balance);
        assert_eq!(balance, dec!(65.50));
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let (tm, _repo, user) = setup(dec!(50.00)).await;
        let mut uow = tm.begin(&[user_key(&user)]).await;
        let err = BalanceLedger::new()
            .apply_movement(
                &mut uow,
                &user,
                MovementKind::Win,
                Decimal::ZERO,
                &RoundId::new("r-1"),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, WageringError::InvalidAmount { .. }));
    }
}
