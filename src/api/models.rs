//! API Request and Response Models

use crate::common::types::UserId;
use crate::ledger::{AccountStatus, LedgerEntry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use crate::service::{LaunchResponse, SpinResult as SpinResponse};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub games: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub game_id: String,
    #[serde(default)]
    pub demo: bool,
}

/// Body of `POST /api/games/bet` and `POST /api/games/win`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerRequest {
    pub session_token: String,
    pub round_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinRequest {
    /// Taken from the path on `/api/game-sessions/:token/spin`
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub game_id: Option<String>,
    pub stake: Decimal,
    #[serde(default)]
    pub round_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub user_id: UserId,
    pub balance: Decimal,
    pub status: AccountStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerQuery {
    #[serde(default = "default_ledger_limit")]
    pub limit: usize,
}

fn default_ledger_limit() -> usize {
    50
}

pub const MAX_LEDGER_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerResponse {
    pub user_id: UserId,
    pub entries: Vec<LedgerEntry>,
}
