//! Error types for the pool game service
//!
//! `GameError` is the taxonomy every engine operation reports. Configuration
//! and storage failures keep their own types and convert into it.

use std::fmt;

/// Configuration and validation errors
#[derive(Debug)]
pub enum ConfigurationError {
    MissingRequired(String),
    InvalidValue { field: String, value: String, reason: String },
    LoadFailed(String),
    SaveFailed(String),
}

/// Ledger storage errors
#[derive(Debug, Clone)]
pub enum StorageError {
    DatabaseOpenFailed(String),
    ReadFailed(String),
    WriteFailed(String),
    CorruptedData(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::MissingRequired(field) => write!(f, "Missing required field: {}", field),
            ConfigurationError::InvalidValue { field, value, reason } => {
                write!(f, "Invalid value for {}: '{}' ({})", field, value, reason)
            }
            ConfigurationError::LoadFailed(msg) => write!(f, "Failed to load configuration: {}", msg),
            ConfigurationError::SaveFailed(msg) => write!(f, "Failed to save configuration: {}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DatabaseOpenFailed(msg) => write!(f, "Database open failed: {}", msg),
            StorageError::ReadFailed(msg) => write!(f, "Read failed: {}", msg),
            StorageError::WriteFailed(msg) => write!(f, "Write failed: {}", msg),
            StorageError::CorruptedData(msg) => write!(f, "Corrupted data: {}", msg),
        }
    }
}

impl std::error::Error for ConfigurationError {}
impl std::error::Error for StorageError {}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

/// Failures of game lifecycle, admission and settlement operations.
///
/// Everything except `InvariantViolation` and `Storage` is an ordinary
/// rejected request: the ledger is untouched and the caller may retry with
/// adjusted input.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GameError {
    #[error("A {variant} game is already active")]
    AlreadyActive { variant: String },

    #[error("No active {variant} game")]
    NoActiveGame { variant: String },

    #[error("Invalid game configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid contribution amount: {0}")]
    InvalidAmount(i64),

    #[error("Contribution of {requested} exceeds cap {cap} (current total {total})")]
    CapExceeded { requested: u64, total: u64, cap: u64 },

    #[error("Game {instance_id} has ended")]
    GameEnded { instance_id: String },

    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Game engine for {0} is not running")]
    EngineUnavailable(String),
}

impl GameError {
    /// Stable machine-readable code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            GameError::AlreadyActive { .. } => "ALREADY_ACTIVE",
            GameError::NoActiveGame { .. } => "NO_ACTIVE_GAME",
            GameError::InvalidConfig(_) => "INVALID_CONFIG",
            GameError::InvalidAmount(_) => "INVALID_AMOUNT",
            GameError::CapExceeded { .. } => "CAP_EXCEEDED",
            GameError::GameEnded { .. } => "GAME_ENDED",
            GameError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            GameError::Storage(_) => "STORAGE_ERROR",
            GameError::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
        }
    }
}

/// Convenience type alias for Results
pub type PoolResult<T> = Result<T, GameError>;

impl From<ConfigurationError> for GameError {
    fn from(e: ConfigurationError) -> Self {
        GameError::InvalidConfig(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::CorruptedData(e.to_string())
    }
}
