//! Wagering service
//!
//! Entry points for the two supported flows:
//!
//! * explicit bet / win / rollback, where the game client reports the
//!   outcome and the server bounds it by the fraud ceiling
//! * server-authoritative spin, where the server draws the outcome and
//!   creates and settles the round in one unit of work
//!
//! Every session-scoped call passes the [`SessionGuard`] first. Validation
//! failures abort before anything is staged; a unit of work that fails to
//! commit leaves storage untouched.

use crate::audit::{AuditSink, NoopRewards, RewardsSink, SecurityEvent, SecurityEventKind, TracingAuditSink};
use crate::common::traits::{Clock, SystemClock};
use crate::common::types::{
    ensure_money_scale, new_demo_token, new_session_token, scale_money, RoundId, TokenDigest,
    UserId,
};
use crate::config::{ConfigValidationError, LimitsConfig, WageringConfig};
use crate::errors::{WageringError, WageringResult};
use crate::games::{GameCatalog, SpinOutcome};
use crate::ledger::{AccountStatus, LedgerEntry, UserAccount};
use crate::metrics::WageringMetrics;
use crate::repository::{round_key, session_key, user_key, Repository};
use crate::rounds::{Actor, Round, RoundLedger};
use crate::session::{Session, SessionGuard, SessionStatus};
use crate::storage::KvStore;
use crate::unit_of_work::{TransactionManager, UnitOfWork};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchResponse {
    pub session_token: String,
    pub launch_url: String,
    pub demo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpinResult {
    pub round_id: RoundId,
    pub symbols: Vec<String>,
    pub is_win: bool,
    pub win_amount: Decimal,
    pub multiplier: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_class: Option<String>,
    pub new_balance: Decimal,
}

impl SpinResult {
    fn from_outcome(round: &Round, outcome: SpinOutcome) -> Self {
        Self {
            round_id: round.round_id.clone(),
            is_win: outcome.is_win(),
            symbols: outcome.symbols,
            win_amount: round.win_amount,
            multiplier: outcome.multiplier,
            win_class: outcome.win_class,
            new_balance: round.balance_after,
        }
    }
}

/// Assembles a [`WageringService`] from configuration and collaborators
pub struct WageringServiceBuilder {
    config: WageringConfig,
    store: Arc<dyn KvStore>,
    audit: Option<Arc<dyn AuditSink>>,
    rewards: Option<Arc<dyn RewardsSink>>,
    clock: Option<Arc<dyn Clock>>,
    rng: Option<StdRng>,
}

impl WageringServiceBuilder {
    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn rewards(mut self, sink: Arc<dyn RewardsSink>) -> Self {
        self.rewards = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this generator instead of one built from `rng_seed` or entropy
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn build(self) -> Result<WageringService, ConfigValidationError> {
        self.config.validate()?;

        let catalog = GameCatalog::from_definitions(self.config.games.clone())?;
        let metrics = WageringMetrics::new()
            .map_err(|e| ConfigValidationError::InvalidValue(format!("metrics registry: {}", e)))?;
        let rng = match (self.rng, self.config.rng_seed) {
            (Some(rng), _) => rng,
            (None, Some(seed)) => StdRng::seed_from_u64(seed),
            (None, None) => StdRng::from_entropy(),
        };

        Ok(WageringService {
            limits: self.config.limits.clone(),
            session_ttl: Duration::seconds(self.config.session.ttl_secs as i64),
            tm: TransactionManager::with_stripes(self.store.clone(), self.config.storage.lock_stripes),
            repo: Repository::new(self.store),
            catalog,
            guard: SessionGuard::new(),
            rounds: RoundLedger::new(self.config.limits.max_win_multiplier),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            rewards: self.rewards.unwrap_or_else(|| Arc::new(NoopRewards)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            rng: Mutex::new(rng),
            metrics,
        })
    }
}

pub struct WageringService {
    limits: LimitsConfig,
    session_ttl: Duration,
    tm: TransactionManager,
    repo: Repository,
    catalog: GameCatalog,
    guard: SessionGuard,
    rounds: RoundLedger,
    audit: Arc<dyn AuditSink>,
    rewards: Arc<dyn RewardsSink>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    metrics: WageringMetrics,
}

impl WageringService {
    pub fn builder(config: WageringConfig, store: Arc<dyn KvStore>) -> WageringServiceBuilder {
        WageringServiceBuilder {
            config,
            store,
            audit: None,
            rewards: None,
            clock: None,
            rng: None,
        }
    }

    pub fn metrics(&self) -> &WageringMetrics {
        &self.metrics
    }

    pub fn catalog(&self) -> &GameCatalog {
        &self.catalog
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    // ------------------------------------------------------------------
    // Account provisioning (deposit/withdraw collaborator seam)
    // ------------------------------------------------------------------

    /// Create an account with an opening balance; existing accounts are returned unchanged
    pub async fn register_account(
        &self,
        user_id: &UserId,
        opening_balance: Decimal,
    ) -> WageringResult<UserAccount> {
        ensure_money_scale(opening_balance)?;
        if opening_balance < Decimal::ZERO {
            return Err(WageringError::InvalidAmount {
                amount: opening_balance,
                reason: "opening balance cannot be negative".to_string(),
            });
        }

        let key = user_key(user_id);
        let mut uow = self.tm.begin(&[key.clone()]).await;
        if let Some(existing) = uow.load::<UserAccount>(&key)? {
            return Ok(existing);
        }
        let account = UserAccount::new(user_id.clone(), opening_balance);
        uow.stage(key, &account)?;
        uow.commit()?;
        info!(user = %user_id, balance = %account.balance, "account registered");
        Ok(account)
    }

    pub async fn set_account_status(
        &self,
        user_id: &UserId,
        status: AccountStatus,
    ) -> WageringResult<UserAccount> {
        self.update_account(user_id, |account| account.status = status)
            .await
    }

    pub async fn set_self_exclusion(
        &self,
        user_id: &UserId,
        until: Option<DateTime<Utc>>,
    ) -> WageringResult<UserAccount> {
        self.update_account(user_id, |account| account.self_exclusion_until = until)
            .await
    }

    async fn update_account<F>(&self, user_id: &UserId, change: F) -> WageringResult<UserAccount>
    where
        F: FnOnce(&mut UserAccount),
    {
        let key = user_key(user_id);
        let mut uow = self.tm.begin(&[key.clone()]).await;
        let mut account: UserAccount = uow
            .load(&key)?
            .ok_or_else(|| WageringError::AccountNotFound(user_id.to_string()))?;
        change(&mut account);
        uow.stage(key, &account)?;
        uow.commit()?;
        Ok(account)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Open a session for `caller`, or a throwaway demo session
    pub async fn launch_session(
        &self,
        caller: &UserId,
        game_id: &str,
        demo: bool,
        origin: Option<&str>,
    ) -> WageringResult<LaunchResponse> {
        if demo {
            return self.launch_demo(game_id);
        }
        let result = self.open_session(caller, game_id, origin).await;
        self.observe("launch", result)
    }

    /// Demo sessions are never persisted and never reach the ledger
    pub fn launch_demo(&self, game_id: &str) -> WageringResult<LaunchResponse> {
        let entry = self.catalog.playable(game_id)?;
        let token = new_demo_token();
        Ok(LaunchResponse {
            launch_url: entry.definition.launch_url(&token, true),
            session_token: token,
            demo: true,
            expires_at: None,
        })
    }

    async fn open_session(
        &self,
        caller: &UserId,
        game_id: &str,
        origin: Option<&str>,
    ) -> WageringResult<LaunchResponse> {
        let now = self.clock.now();
        let entry = self.catalog.playable(game_id)?;
        let token = new_session_token();
        let session = Session::open(
            &token,
            caller.clone(),
            game_id.to_string(),
            origin.map(str::to_string),
            now,
            self.session_ttl,
        );

        let mut uow = self
            .tm
            .begin(&[user_key(caller), session.storage_key()])
            .await;
        let account: UserAccount = uow
            .load(&user_key(caller))?
            .ok_or_else(|| WageringError::AccountNotFound(caller.to_string()))?;
        if account.status != AccountStatus::Active {
            return Err(WageringError::AccountInactive(caller.to_string()));
        }
        if account.is_self_excluded(now) {
            return Err(WageringError::SelfExcluded(caller.to_string()));
        }

        uow.stage(session.storage_key(), &session)?;
        uow.commit()?;

        info!(
            user = %caller,
            game = game_id,
            session = %session.token_digest,
            origin = ?origin,
            expires_at = %session.expires_at,
            "game launched"
        );

        Ok(LaunchResponse {
            launch_url: entry.definition.launch_url(&token, false),
            session_token: token,
            demo: false,
            expires_at: Some(session.expires_at),
        })
    }

    /// Explicit end of play: `ACTIVE -> COMPLETED`
    pub async fn end_session(
        &self,
        caller: &UserId,
        token: &str,
        origin: Option<&str>,
    ) -> WageringResult<()> {
        let result = async {
            let now = self.clock.now();
            let key = session_key(&TokenDigest::of(token));
            let mut uow = self.tm.begin(&[user_key(caller), key.clone()]).await;
            let mut session = self.check_session(&mut uow, token, caller, origin, now)?;
            session.status = SessionStatus::Completed;
            session.ended_at = Some(now);
            uow.stage(key, &session)?;
            self.commit(uow, "end_session", None)?;
            info!(
                user = %caller,
                session = %session.token_digest,
                rounds = session.round_count,
                staked = %session.total_staked,
                won = %session.total_won,
                "session ended"
            );
            Ok(())
        }
        .await;
        self.observe("end_session", result)
    }

    pub fn session_info(&self, caller: &UserId, token: &str) -> WageringResult<Session> {
        let session = self
            .repo
            .session(&TokenDigest::of(token))?
            .ok_or(WageringError::SessionNotFound)?;
        if &session.user_id != caller {
            return Err(WageringError::SessionNotOwned);
        }
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Explicit bet / win / rollback
    // ------------------------------------------------------------------

    /// Debit a stake and open a round; returns the new balance
    ///
    /// A failed commit is retried once. If the first attempt did land, the
    /// retry reports `DuplicateRound` instead of charging twice.
    pub async fn place_bet(
        &self,
        caller: &UserId,
        token: &str,
        round_id: &RoundId,
        stake: Decimal,
        origin: Option<&str>,
    ) -> WageringResult<Decimal> {
        let result = async {
            self.validate_stake(stake)?;
            let mut retried = false;
            loop {
                match self.try_place_bet(caller, token, round_id, stake, origin).await {
                    Err(WageringError::CommitFailed { reason, .. }) if !retried => {
                        warn!(round = %round_id, user = %caller, reason = %reason, "bet commit failed, retrying once");
                        retried = true;
                    }
                    other => return other,
                }
            }
        }
        .await;
        self.observe("bet", result)
    }

    async fn try_place_bet(
        &self,
        caller: &UserId,
        token: &str,
        round_id: &RoundId,
        stake: Decimal,
        origin: Option<&str>,
    ) -> WageringResult<Decimal> {
        let now = self.clock.now();
        let mut uow = self.begin_round_unit(caller, token, round_id).await;
        let session = self.check_session(&mut uow, token, caller, origin, now)?;
        let round = self.rounds.create(&mut uow, round_id, &session, stake, now)?;
        self.commit(uow, "bet", Some(round_id))?;

        self.metrics.add_staked(round.stake);
        self.rewards
            .wager_placed(caller, round.stake, &session.token_digest);
        info!(round = %round_id, user = %caller, stake = %round.stake, balance = %round.balance_after, "bet placed");
        Ok(round.balance_after)
    }

    /// Settle a round with a win reported by the game client; returns the new balance
    pub async fn report_win(
        &self,
        caller: &UserId,
        token: &str,
        round_id: &RoundId,
        claimed: Decimal,
        origin: Option<&str>,
    ) -> WageringResult<Decimal> {
        let result = async {
            if !self.limits.accept_reported_wins {
                return Err(WageringError::ReportedWinsDisabled);
            }
            ensure_money_scale(claimed)?;

            let now = self.clock.now();
            let mut uow = self.begin_round_unit(caller, token, round_id).await;
            let session = self.check_session(&mut uow, token, caller, origin, now)?;
            self.ensure_round_owned(&uow, round_id, &session, caller, origin, now)?;

            let round = match self.rounds.settle(&mut uow, round_id, claimed, now) {
                Err(WageringError::InvalidWinAmount { claimed, allowed }) => {
                    self.raise(
                        SecurityEvent::new(
                            SecurityEventKind::FraudAttempt,
                            "claimed win exceeds maximum win multiplier",
                            now,
                        )
                        .user(caller)
                        .session(&session.token_digest)
                        .round(round_id)
                        .origin(origin)
                        .amounts(claimed, allowed),
                    );
                    return Err(WageringError::InvalidWinAmount { claimed, allowed });
                }
                other => other?,
            };
            self.commit(uow, "win", Some(round_id))?;

            self.metrics.add_paid_out(round.win_amount);
            Ok(round.balance_after)
        }
        .await;
        self.observe("win", result)
    }

    /// Refund the stake of a pending round
    pub async fn rollback(&self, actor: &Actor, round_id: &RoundId) -> WageringResult<Round> {
        let result = async {
            let now = self.clock.now();
            let owner = self
                .repo
                .round(round_id)?
                .ok_or_else(|| WageringError::RoundNotFound(round_id.to_string()))?
                .user_id;

            let mut uow = self
                .tm
                .begin(&[user_key(&owner), round_key(round_id)])
                .await;
            let round = match self.rounds.rollback(&mut uow, round_id, actor, now) {
                Err(WageringError::RoundNotOwned(id)) => {
                    let mut event = SecurityEvent::new(
                        SecurityEventKind::RoundNotOwned,
                        format!("rollback requested by {}", actor.describe()),
                        now,
                    )
                    .round(round_id);
                    if let Actor::Player(user) = actor {
                        event = event.user(user);
                    }
                    self.raise(event);
                    return Err(WageringError::RoundNotOwned(id));
                }
                other => other?,
            };
            self.commit(uow, "rollback", Some(round_id))?;

            self.metrics.add_refunded(round.stake);
            Ok(round)
        }
        .await;
        self.observe("rollback", result)
    }

    // ------------------------------------------------------------------
    // Server-authoritative spin
    // ------------------------------------------------------------------

    /// Stake, draw and settle one spin atomically
    ///
    /// `game_id`, when given, must match the session's game. A missing
    /// `round_id` is generated server-side.
    pub async fn spin(
        &self,
        caller: &UserId,
        token: &str,
        game_id: Option<&str>,
        stake: Decimal,
        round_id: Option<RoundId>,
        origin: Option<&str>,
    ) -> WageringResult<SpinResult> {
        let round_id = round_id.unwrap_or_else(RoundId::generate);
        let result = async {
            self.validate_stake(stake)?;

            let now = self.clock.now();
            let mut uow = self.begin_round_unit(caller, token, &round_id).await;
            let session = self.check_session(&mut uow, token, caller, origin, now)?;
            if let Some(requested) = game_id {
                if requested != session.game_id {
                    return Err(WageringError::GameMismatch {
                        requested: requested.to_string(),
                        session_game: session.game_id.clone(),
                    });
                }
            }
            let entry = self.catalog.playable(&session.game_id)?;

            self.rounds.create(&mut uow, &round_id, &session, stake, now)?;
            let outcome = {
                let mut rng = match self.rng.lock() {
                    Ok(rng) => rng,
                    Err(poisoned) => poisoned.into_inner(),
                };
                entry.generator.generate(stake, &mut *rng)
            };

            let round = match self.rounds.settle(&mut uow, &round_id, outcome.win_amount, now) {
                Err(WageringError::InvalidWinAmount { claimed, allowed }) => {
                    self.raise(
                        SecurityEvent::new(
                            SecurityEventKind::FraudAttempt,
                            "server spin exceeded maximum win multiplier",
                            now,
                        )
                        .user(caller)
                        .session(&session.token_digest)
                        .round(&round_id)
                        .amounts(claimed, allowed),
                    );
                    return Err(WageringError::InvalidWinAmount { claimed, allowed });
                }
                other => other?,
            };
            self.commit(uow, "spin", Some(&round_id))?;

            self.metrics.add_staked(round.stake);
            self.metrics.add_paid_out(round.win_amount);
            self.rewards
                .wager_placed(caller, round.stake, &session.token_digest);
            Ok(SpinResult::from_outcome(&round, outcome))
        }
        .await;
        self.observe("spin", result)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn balance(&self, user_id: &UserId) -> WageringResult<Decimal> {
        Ok(self
            .repo
            .account(user_id)?
            .ok_or_else(|| WageringError::AccountNotFound(user_id.to_string()))?
            .balance)
    }

    pub fn account(&self, user_id: &UserId) -> WageringResult<UserAccount> {
        self.repo
            .account(user_id)?
            .ok_or_else(|| WageringError::AccountNotFound(user_id.to_string()))
    }

    /// Round visible to its owner only
    pub fn round(&self, caller: &UserId, round_id: &RoundId) -> WageringResult<Round> {
        let round = self
            .repo
            .round(round_id)?
            .ok_or_else(|| WageringError::RoundNotFound(round_id.to_string()))?;
        if &round.user_id != caller {
            self.raise(
                SecurityEvent::new(
                    SecurityEventKind::RoundNotOwned,
                    "round lookup by non-owner",
                    self.clock.now(),
                )
                .user(caller)
                .round(round_id),
            );
            return Err(WageringError::RoundNotOwned(round_id.to_string()));
        }
        Ok(round)
    }

    pub fn ledger(&self, user_id: &UserId, limit: usize) -> WageringResult<Vec<LedgerEntry>> {
        Ok(self.repo.recent_ledger_entries(user_id, limit)?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn validate_stake(&self, stake: Decimal) -> WageringResult<()> {
        ensure_money_scale(stake)?;
        if stake <= Decimal::ZERO {
            return Err(WageringError::InvalidAmount {
                amount: stake,
                reason: "stake must be positive".to_string(),
            });
        }
        if stake < self.limits.min_bet || stake > self.limits.max_bet {
            return Err(WageringError::StakeOutOfRange {
                stake,
                min: scale_money(self.limits.min_bet),
                max: scale_money(self.limits.max_bet),
            });
        }
        Ok(())
    }

    async fn begin_round_unit(&self, caller: &UserId, token: &str, round_id: &RoundId) -> UnitOfWork {
        self.tm
            .begin(&[
                user_key(caller),
                session_key(&TokenDigest::of(token)),
                round_key(round_id),
            ])
            .await
    }

    /// Guard check plus its side effects: lazy expiry is persisted and
    /// security failures are reported
    fn check_session(
        &self,
        uow: &mut UnitOfWork,
        token: &str,
        caller: &UserId,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> WageringResult<Session> {
        match self.guard.validate(uow, token, caller, origin, now) {
            Ok(session) => Ok(session),
            Err(WageringError::SessionExpired) => {
                if let Err(e) = uow.flush() {
                    error!(user = %caller, error = %e, "failed to persist session expiry");
                }
                Err(WageringError::SessionExpired)
            }
            Err(WageringError::SessionNotOwned) => {
                self.raise(
                    SecurityEvent::new(
                        SecurityEventKind::SessionHijackAttempt,
                        "session token presented by a user who does not own it",
                        now,
                    )
                    .user(caller)
                    .session(&TokenDigest::of(token))
                    .origin(origin),
                );
                Err(WageringError::SessionNotOwned)
            }
            Err(WageringError::OriginMismatch) => {
                self.raise(
                    SecurityEvent::new(
                        SecurityEventKind::OriginMismatch,
                        "request origin differs from the origin bound at launch",
                        now,
                    )
                    .user(caller)
                    .session(&TokenDigest::of(token))
                    .origin(origin),
                );
                Err(WageringError::OriginMismatch)
            }
            Err(e) => Err(e),
        }
    }

    fn ensure_round_owned(
        &self,
        uow: &UnitOfWork,
        round_id: &RoundId,
        session: &Session,
        caller: &UserId,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> WageringResult<()> {
        let round: Round = uow
            .load(&round_key(round_id))?
            .ok_or_else(|| WageringError::RoundNotFound(round_id.to_string()))?;
        if round.session != session.token_digest {
            self.raise(
                SecurityEvent::new(
                    SecurityEventKind::RoundNotOwned,
                    "win reported for a round of another session",
                    now,
                )
                .user(caller)
                .session(&session.token_digest)
                .round(round_id)
                .origin(origin),
            );
            return Err(WageringError::RoundNotOwned(round_id.to_string()));
        }
        Ok(())
    }

    fn commit(
        &self,
        uow: UnitOfWork,
        operation: &'static str,
        round_id: Option<&RoundId>,
    ) -> WageringResult<()> {
        let started = Instant::now();
        let result = uow.commit();
        self.metrics.observe_commit(started.elapsed());
        result.map(|_| ()).map_err(|e| {
            let round_id = round_id.map(|r| r.to_string()).unwrap_or_default();
            error!(
                operation,
                round = %round_id,
                error = %e,
                "unit of work failed to commit"
            );
            WageringError::CommitFailed {
                operation,
                round_id,
                reason: e.to_string(),
            }
        })
    }

    fn raise(&self, event: SecurityEvent) {
        self.metrics.record_security_event(event.kind.as_str());
        self.audit.record(event);
    }

    fn observe<T>(&self, operation: &str, result: WageringResult<T>) -> WageringResult<T> {
        match &result {
            Ok(_) => self.metrics.record_success(operation),
            Err(e) => self.metrics.record_failure(operation, e),
        }
        result
    }
}
