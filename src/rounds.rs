//! Round ledger: the wagering round state machine
//!
//! ```text
//!   create ──► PENDING ──settle──► COMPLETED
//!                 │
//!                 └────rollback──► ROLLED_BACK
//! ```
//!
//! Every transition is staged into a caller-provided unit of work together
//! with its balance movement. Both terminal states reject any further
//! transition.

use crate::common::types::{scale_money, RoundId, TokenDigest, UserId};
use crate::errors::{WageringError, WageringResult};
use crate::ledger::{BalanceLedger, MovementKind, UserAccount};
use crate::repository::{round_key, session_key, user_key};
use crate::session::Session;
use crate::unit_of_work::UnitOfWork;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Pending,
    Completed,
    RolledBack,
}

impl RoundStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RoundStatus::Pending)
    }
}

/// One atomic wager
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub round_id: RoundId,
    pub session: TokenDigest,
    pub user_id: UserId,
    pub game_id: String,
    pub stake: Decimal,
    pub win_amount: Decimal,
    /// Balance before the stake was debited
    pub balance_before: Decimal,
    /// Balance after the latest transition
    pub balance_after: Decimal,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

/// Who is asking for a rollback
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Actor {
    /// The authenticated player; may only roll back their own rounds
    Player(UserId),
    /// Server-to-server caller such as a game provider callback
    Operator(String),
}

impl Actor {
    pub fn describe(&self) -> String {
        match self {
            Actor::Player(user) => format!("player:{}", user),
            Actor::Operator(id) => format!("operator:{}", id),
        }
    }
}

pub struct RoundLedger {
    balances: BalanceLedger,
    max_win_multiplier: Decimal,
}

impl RoundLedger {
    pub fn new(max_win_multiplier: Decimal) -> Self {
        Self {
            balances: BalanceLedger::new(),
            max_win_multiplier,
        }
    }

    pub fn max_win_multiplier(&self) -> Decimal {
        self.max_win_multiplier
    }

    /// Largest win a round with this stake may pay
    pub fn win_ceiling(&self, stake: Decimal) -> Decimal {
        scale_money(stake * self.max_win_multiplier)
    }

    /// Accept a stake and open a `PENDING` round
    pub fn create(
        &self,
        uow: &mut UnitOfWork,
        round_id: &RoundId,
        session: &Session,
        stake: Decimal,
        now: DateTime<Utc>,
    ) -> WageringResult<Round> {
        let key = round_key(round_id);
        if uow.exists(&key)? {
            return Err(WageringError::DuplicateRound(round_id.to_string()));
        }

        let entry = self.balances.apply_movement(
            uow,
            &session.user_id,
            MovementKind::Bet,
            stake,
            round_id,
            now,
        )?;

        let round = Round {
            round_id: round_id.clone(),
            session: session.token_digest.clone(),
            user_id: session.user_id.clone(),
            game_id: session.game_id.clone(),
            stake: entry.amount,
            win_amount: scale_money(Decimal::ZERO),
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            status: RoundStatus::Pending,
            created_at: now,
            settled_at: None,
        };

        let mut session = session.clone();
        session.total_staked = scale_money(session.total_staked + entry.amount);
        session.round_count += 1;
        uow.stage(session.storage_key(), &session)?;
        uow.stage(key, &round)?;

        debug!(round = %round_id, user = %round.user_id, stake = %round.stake, "round created");
        Ok(round)
    }

    /// Apply a win and complete a `PENDING` round
    ///
    /// The win is checked against the ceiling before anything is staged; a
    /// rejected win leaves the round untouched.
    pub fn settle(
        &self,
        uow: &mut UnitOfWork,
        round_id: &RoundId,
        win_amount: Decimal,
        now: DateTime<Utc>,
    ) -> WageringResult<Round> {
        let key = round_key(round_id);
        let mut round: Round = uow
            .load(&key)?
            .ok_or_else(|| WageringError::RoundNotFound(round_id.to_string()))?;

        match round.status {
            RoundStatus::Pending => {}
            RoundStatus::Completed => {
                return Err(WageringError::RoundAlreadySettled(round_id.to_string()))
            }
            RoundStatus::RolledBack => {
                return Err(WageringError::RoundAlreadyRolledBack(round_id.to_string()))
            }
        }

        if win_amount < Decimal::ZERO {
            return Err(WageringError::InvalidAmount {
                amount: win_amount,
                reason: "win amount cannot be negative".to_string(),
            });
        }

        let allowed = self.win_ceiling(round.stake);
        if win_amount > allowed {
            return Err(WageringError::InvalidWinAmount {
                claimed: win_amount,
                allowed,
            });
        }

        let balance_after = if win_amount > Decimal::ZERO {
            self.balances
                .apply_movement(uow, &round.user_id, MovementKind::Win, win_amount, round_id, now)?
                .balance_after
        } else {
            let account: UserAccount = uow
                .load(&user_key(&round.user_id))?
                .ok_or_else(|| WageringError::AccountNotFound(round.user_id.to_string()))?;
            account.balance
        };

        round.win_amount = scale_money(win_amount);
        round.balance_after = balance_after;
        round.status = RoundStatus::Completed;
        round.settled_at = Some(now);

        let skey = session_key(&round.session);
        if let Some(mut session) = uow.load::<Session>(&skey)? {
            session.total_won = scale_money(session.total_won + round.win_amount);
            uow.stage(skey, &session)?;
        }
        uow.stage(key, &round)?;

        info!(
            round = %round_id,
            user = %round.user_id,
            stake = %round.stake,
            win = %round.win_amount,
            balance = %round.balance_after,
            "round settled"
        );
        Ok(round)
    }

    /// Refund the stake of a `PENDING` round
    pub fn rollback(
        &self,
        uow: &mut UnitOfWork,
        round_id: &RoundId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WageringResult<Round> {
        let key = round_key(round_id);
        let mut round: Round = uow
            .load(&key)?
            .ok_or_else(|| WageringError::RoundNotFound(round_id.to_string()))?;

        if let Actor::Player(user) = actor {
            if user != &round.user_id {
                return Err(WageringError::RoundNotOwned(round_id.to_string()));
            }
        }

        match round.status {
            RoundStatus::Pending => {}
            RoundStatus::Completed => {
                return Err(WageringError::RoundAlreadySettled(round_id.to_string()))
            }
            RoundStatus::RolledBack => {
                return Err(WageringError::RoundAlreadyRolledBack(round_id.to_string()))
            }
        }

        let entry = self.balances.apply_movement(
            uow,
            &round.user_id,
            MovementKind::Refund,
            round.stake,
            round_id,
            now,
        )?;

        round.balance_after = entry.balance_after;
        round.status = RoundStatus::RolledBack;
        round.settled_at = Some(now);
        uow.stage(key, &round)?;

        info!(
            round = %round_id,
            user = %round.user_id,
            refund = %round.stake,
            actor = %actor.describe(),
            "round rolled back"
        );
        Ok(round)
    }
}
