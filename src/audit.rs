//! Security-signal and rewards notification sinks
//!
//! Security events are raised for session hijack attempts, origin
//! mismatches, fraud-ceiling violations and cross-account round access.
//! They are never dropped silently: a sink that cannot persist an event
//! logs it at error level instead.

use crate::common::types::{RoundId, TokenDigest, UserId};
use crate::repository::audit_key;
use crate::storage::{BatchOp, KvStore};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    /// Valid session token presented by another user
    SessionHijackAttempt,
    /// Request origin differs from the origin bound at launch
    OriginMismatch,
    /// Claimed win above the ceiling
    FraudAttempt,
    /// Round referenced from a session or player that does not own it
    RoundNotOwned,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::SessionHijackAttempt => "SESSION_HIJACK_ATTEMPT",
            SecurityEventKind::OriginMismatch => "ORIGIN_MISMATCH",
            SecurityEventKind::FraudAttempt => "FRAUD_ATTEMPT",
            SecurityEventKind::RoundNotOwned => "ROUND_NOT_OWNED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_id: String,
    pub kind: SecurityEventKind,
    /// Authenticated caller that triggered the event
    pub user_id: Option<UserId>,
    pub session: Option<TokenDigest>,
    pub round_id: Option<RoundId>,
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Decimal>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, detail: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            kind,
            user_id: None,
            session: None,
            round_id: None,
            origin: None,
            claimed: None,
            allowed: None,
            detail: detail.into(),
            at,
        }
    }

    pub fn user(mut self, user_id: &UserId) -> Self {
        self.user_id = Some(user_id.clone());
        self
    }

    pub fn session(mut self, digest: &TokenDigest) -> Self {
        self.session = Some(digest.clone());
        self
    }

    pub fn round(mut self, round_id: &RoundId) -> Self {
        self.round_id = Some(round_id.clone());
        self
    }

    pub fn origin(mut self, origin: Option<&str>) -> Self {
        self.origin = origin.map(str::to_string);
        self
    }

    pub fn amounts(mut self, claimed: Decimal, allowed: Decimal) -> Self {
        self.claimed = Some(claimed);
        self.allowed = Some(allowed);
        self
    }
}

/// Receiver of security signals
pub trait AuditSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

fn log_event(event: &SecurityEvent) {
    warn!(
        kind = event.kind.as_str(),
        user = ?event.user_id.as_ref().map(|u| u.as_str()),
        session = ?event.session.as_ref().map(|s| s.to_string()),
        round = ?event.round_id.as_ref().map(|r| r.as_str()),
        origin = ?event.origin,
        claimed = ?event.claimed,
        allowed = ?event.allowed,
        detail = %event.detail,
        "security event"
    );
}

/// Structured log only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: SecurityEvent) {
        log_event(&event);
    }
}

/// Durable `audit:` records plus the structured log line
pub struct StoreAuditSink {
    store: Arc<dyn KvStore>,
}

impl StoreAuditSink {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

impl AuditSink for StoreAuditSink {
    fn record(&self, event: SecurityEvent) {
        log_event(&event);
        let key = audit_key(&event);
        let write = crate::repository::encode(&key, &event)
            .and_then(|value| self.store.write_batch(vec![BatchOp::Put { key, value }]));
        if let Err(e) = write {
            error!(
                event_id = %event.event_id,
                kind = event.kind.as_str(),
                error = %e,
                "failed to persist security event"
            );
        }
    }
}

/// Keeps events in memory; used by tests and embedders
#[derive(Debug, Default, Clone)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: SecurityEventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: SecurityEvent) {
        log_event(&event);
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Notified after each committed stake, e.g. for loyalty point accrual
pub trait RewardsSink: Send + Sync {
    fn wager_placed(&self, user_id: &UserId, amount: Decimal, session: &TokenDigest);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRewards;

impl RewardsSink for NoopRewards {
    fn wager_placed(&self, _user_id: &UserId, _amount: Decimal, _session: &TokenDigest) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRewards;

impl RewardsSink for TracingRewards {
    fn wager_placed(&self, user_id: &UserId, amount: Decimal, session: &TokenDigest) {
        info!(user = %user_id, amount = %amount, session = %session, "wager eligible for rewards");
    }
}
