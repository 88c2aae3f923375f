//! Error type shared across all PostPilot crates.
//!
//! Expected local conditions (unknown id, duplicate time, already-taken
//! lead) are plain return values, not errors. Only storage and transport
//! failures travel as `PostPilotError`.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PostPilotError>;

/// All failure categories that cross a crate boundary.
#[derive(Debug, thiserror::Error)]
pub enum PostPilotError {
    /// Configuration missing or unparseable.
    #[error("Config error: {0}")]
    Config(String),

    /// Underlying SQLite failure. Not recoverable locally.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Telegram transport failure (network or API-level).
    #[error("Channel error: {0}")]
    Channel(String),

    /// Input rejected before any write.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
