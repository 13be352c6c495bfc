//! Shared type definitions for the wagering core
//!
//! Identifiers, money helpers and session token digests used by every
//! layer. Money is always `rust_decimal::Decimal` scaled to two fraction
//! digits; binary floating point never touches a balance.

use crate::errors::{WageringError, WageringResult};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of fraction digits carried by every currency amount
pub const MONEY_SCALE: u32 = 2;

/// Prefix marking a demo session token; such tokens never touch storage
pub const DEMO_TOKEN_PREFIX: &str = "demo-";

/// Authenticated player identity, resolved upstream
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Caller-supplied idempotency key of one wagering round
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub String);

impl RoundId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh server-side key for spins whose caller did not supply one
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoundId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// SHA-256 digest of a session token, the only form a token is stored in
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenDigest(pub String);

impl TokenDigest {
    pub fn of(token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to correlate log lines
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// Generate an opaque session token
pub fn new_session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Generate a demo token; demo tokens are never persisted
pub fn new_demo_token() -> String {
    format!("{}{}", DEMO_TOKEN_PREFIX, uuid::Uuid::new_v4())
}

pub fn is_demo_token(token: &str) -> bool {
    token.starts_with(DEMO_TOKEN_PREFIX)
}

/// Reject externally supplied amounts that carry more than two fraction digits
pub fn ensure_money_scale(amount: Decimal) -> WageringResult<()> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(WageringError::InvalidAmount {
            amount,
            reason: format!("at most {} fraction digits allowed", MONEY_SCALE),
        });
    }
    Ok(())
}

/// Truncate a computed amount toward zero at currency scale
pub fn truncate_money(amount: Decimal) -> Decimal {
    let mut truncated = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero);
    truncated.rescale(MONEY_SCALE);
    truncated
}

/// Normalise an accepted amount to exactly two fraction digits for storage and display
pub fn scale_money(amount: Decimal) -> Decimal {
    let mut scaled = amount;
    scaled.rescale(MONEY_SCALE);
    scaled
}
