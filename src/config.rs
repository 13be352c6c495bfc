//! Configuration management with validation and defaults
//!
//! Every section has a serde default so a TOML file only needs the values
//! it changes. [`crate::common::config::ConfigLoader`] layers environment
//! overrides on top and calls [`WageringConfig::validate`].

use crate::games::{default_games, GameCatalog, GameDefinition};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WageringConfig {
    pub session: SessionConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
    /// Seed for the outcome RNG; entropy when absent
    pub rng_seed: Option<u64>,
    pub games: Vec<GameDefinition>,
}

impl Default for WageringConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            limits: LimitsConfig::default(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            monitoring: MonitoringConfig::default(),
            rng_seed: None,
            games: default_games(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 2 * 60 * 60,
        }
    }
}

/// Money and rate limits
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub min_bet: Decimal,
    pub max_bet: Decimal,
    /// Largest multiple of stake a single round may pay
    pub max_win_multiplier: Decimal,
    /// Accept win amounts reported by the game client
    pub accept_reported_wins: bool,
    pub bet_ops_per_second: u32,
    pub spin_ops_per_second: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_bet: dec!(0.01),
            max_bet: dec!(1000.00),
            max_win_multiplier: dec!(1000),
            accept_reported_wins: true,
            bet_ops_per_second: 20,
            spin_ops_per_second: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Rocksdb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub lock_stripes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_directory: "./DB/wagering_data".to_string(),
            lock_stripes: crate::unit_of_work::DEFAULT_LOCK_STRIPES,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Take the caller origin from `x-forwarded-for` when present
    pub trust_forwarded_for: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            trust_forwarded_for: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub log_filter: String,
    /// Persist security events under `audit:` in addition to logging them
    pub persist_audit_events: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_filter: "wagering=info,tower_http=info".to_string(),
            persist_audit_events: true,
        }
    }
}

impl WageringConfig {
    /// Durable storage, strict CORS, no client-reported wins
    pub fn production() -> Self {
        Self {
            limits: LimitsConfig {
                accept_reported_wins: false,
                ..Default::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::Rocksdb,
                ..Default::default()
            },
            api: ApiConfig {
                allowed_origins: vec![],
                request_timeout_secs: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// In-memory storage with a fixed seed for reproducible runs
    pub fn testing() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                lock_stripes: 64,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                persist_audit_events: false,
                ..Default::default()
            },
            rng_seed: Some(42),
            ..Default::default()
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.session.ttl_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "session.ttl_secs must be > 0".to_string(),
            ));
        }

        let limits = &self.limits;
        if limits.min_bet <= Decimal::ZERO {
            return Err(ConfigValidationError::InvalidValue(
                "limits.min_bet must be > 0".to_string(),
            ));
        }
        if limits.max_bet < limits.min_bet {
            return Err(ConfigValidationError::LogicalInconsistency(format!(
                "limits.max_bet {} is below limits.min_bet {}",
                limits.max_bet, limits.min_bet
            )));
        }
        if limits.max_win_multiplier < Decimal::ONE {
            return Err(ConfigValidationError::InvalidValue(
                "limits.max_win_multiplier must be >= 1".to_string(),
            ));
        }
        if limits.bet_ops_per_second == 0 || limits.spin_ops_per_second == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "rate limits must be > 0".to_string(),
            ));
        }

        if self.storage.lock_stripes == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "storage.lock_stripes must be > 0".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Rocksdb
            && self.storage.data_directory.trim().is_empty()
        {
            return Err(ConfigValidationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }

        if self.api.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "api.port cannot be zero".to_string(),
            ));
        }

        if self.games.is_empty() {
            return Err(ConfigValidationError::MissingRequired("games".to_string()));
        }
        let catalog = GameCatalog::from_definitions(self.games.clone())?;
        // Every game's best line must stay under the fraud ceiling
        for entry in catalog.definitions() {
            let max = entry.pay_table().max_multiplier();
            if max > limits.max_win_multiplier {
                return Err(ConfigValidationError::LogicalInconsistency(format!(
                    "game {} can pay {}x, above max_win_multiplier {}",
                    entry.game_id, max, limits.max_win_multiplier
                )));
            }
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Configuration logical inconsistency: {0}")]
    LogicalInconsistency(String),
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
