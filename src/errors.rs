//! Error types for the wagering core
//!
//! Every failure carries enough context for the caller and for the audit
//! trail. Errors are grouped into categories so the HTTP layer and the
//! audit pipeline can treat validation, security and consistency failures
//! differently.

use rust_decimal::Decimal;

/// How a failure should be treated by callers and operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Expected, user-facing rejection; nothing changed
    Validation,
    /// Rejected and recorded to the audit sink
    Security,
    /// The atomic unit of work did not commit; needs reconciliation unless retried
    Consistency,
    /// Storage or serialization fault
    Internal,
}

/// Root error type for all wagering operations
#[derive(Debug, thiserror::Error)]
pub enum WageringError {
    // Validation
    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    #[error("Round {0} already exists")]
    DuplicateRound(String),

    #[error("Round {0} not found")]
    RoundNotFound(String),

    #[error("Round {0} already settled")]
    RoundAlreadySettled(String),

    #[error("Round {0} already rolled back")]
    RoundAlreadyRolledBack(String),

    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: String },

    #[error("Stake {stake} outside allowed range [{min}, {max}]")]
    StakeOutOfRange { stake: Decimal, min: Decimal, max: Decimal },

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session is closed")]
    SessionClosed,

    #[error("Account {0} not found")]
    AccountNotFound(String),

    #[error("Account {0} is not active")]
    AccountInactive(String),

    #[error("Account {0} is self-excluded")]
    SelfExcluded(String),

    #[error("Game {0} not found")]
    GameNotFound(String),

    #[error("Game {0} is not available")]
    GameUnavailable(String),

    #[error("Game {requested} does not match session game {session_game}")]
    GameMismatch { requested: String, session_game: String },

    #[error("Client-reported wins are disabled")]
    ReportedWinsDisabled,

    // Security signals
    #[error("Session does not belong to caller")]
    SessionNotOwned,

    #[error("Request origin does not match session origin")]
    OriginMismatch,

    #[error("Invalid win amount {claimed}: exceeds maximum {allowed}")]
    InvalidWinAmount { claimed: Decimal, allowed: Decimal },

    #[error("Round {0} does not belong to caller")]
    RoundNotOwned(String),

    // Consistency
    #[error("Commit of {operation} for round {round_id} failed: {reason}")]
    CommitFailed {
        operation: &'static str,
        round_id: String,
        reason: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WageringError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WageringError::SessionNotOwned
            | WageringError::OriginMismatch
            | WageringError::InvalidWinAmount { .. }
            | WageringError::RoundNotOwned(_) => ErrorCategory::Security,
            WageringError::CommitFailed { .. } => ErrorCategory::Consistency,
            WageringError::Storage(_) => ErrorCategory::Internal,
            _ => ErrorCategory::Validation,
        }
    }

    /// Stable machine-readable code used on the wire and in metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            WageringError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            WageringError::DuplicateRound(_) => "DUPLICATE_ROUND",
            WageringError::RoundNotFound(_) => "ROUND_NOT_FOUND",
            WageringError::RoundAlreadySettled(_) => "ROUND_ALREADY_SETTLED",
            WageringError::RoundAlreadyRolledBack(_) => "ROUND_ALREADY_ROLLED_BACK",
            WageringError::InvalidAmount { .. } => "INVALID_AMOUNT",
            WageringError::StakeOutOfRange { .. } => "STAKE_OUT_OF_RANGE",
            WageringError::SessionNotFound => "SESSION_NOT_FOUND",
            WageringError::SessionExpired => "SESSION_EXPIRED",
            WageringError::SessionClosed => "SESSION_CLOSED",
            WageringError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            WageringError::AccountInactive(_) => "ACCOUNT_INACTIVE",
            WageringError::SelfExcluded(_) => "SELF_EXCLUDED",
            WageringError::GameNotFound(_) => "GAME_NOT_FOUND",
            WageringError::GameUnavailable(_) => "GAME_UNAVAILABLE",
            WageringError::GameMismatch { .. } => "GAME_MISMATCH",
            WageringError::ReportedWinsDisabled => "REPORTED_WINS_DISABLED",
            WageringError::SessionNotOwned => "SESSION_NOT_OWNED",
            WageringError::OriginMismatch => "ORIGIN_MISMATCH",
            WageringError::InvalidWinAmount { .. } => "INVALID_WIN_AMOUNT",
            WageringError::RoundNotOwned(_) => "ROUND_NOT_OWNED",
            WageringError::CommitFailed { .. } => "COMMIT_FAILED",
            WageringError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Storage system errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    OpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data under {key}: {reason}")]
    CorruptedData { key: String, reason: String },
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::ReadFailed(e.to_string())
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Validation(#[from] crate::config::ConfigValidationError),
}

// Convenience type alias for Results
pub type WageringResult<T> = Result<T, WageringError>;
