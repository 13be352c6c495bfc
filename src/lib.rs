//! Wagering - transactional core of a casino game platform
//!
//! Sessions bind a player to one game for a bounded time and one network
//! origin. Inside a session every wager is a round: a stake debit, then
//! exactly one settlement or rollback, each recorded as a ledger movement
//! and committed atomically with the balance it changes. Slot outcomes can
//! be drawn server-side against a configured RTP; client-reported wins are
//! bounded by a fraud ceiling.

pub mod api;
pub mod audit;
pub mod common;
pub mod config;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod metrics;
pub mod repository;
pub mod rounds;
pub mod service;
pub mod session;
pub mod storage;
pub mod unit_of_work;

pub use audit::{AuditSink, RewardsSink, SecurityEvent, SecurityEventKind};
pub use common::types::{RoundId, TokenDigest, UserId};
pub use config::WageringConfig;
pub use errors::{ErrorCategory, StorageError, WageringError, WageringResult};
pub use ledger::{AccountStatus, LedgerEntry, MovementKind, UserAccount};
pub use rounds::{Actor, Round, RoundStatus};
pub use service::{LaunchResponse, SpinResult, WageringService};
pub use session::{Session, SessionStatus};
pub use storage::{KvStore, MemoryStore};

#[cfg(feature = "rocksdb")]
pub use storage::RocksStore;
