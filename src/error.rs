//! Error types for the game.
//!
//! [`GameError`] covers everything a caller can observe failing: rejected
//! session starts, storage and settings I/O. Failures of fire-and-forget
//! writes never surface here; they are logged where they happen.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameError {
    /// Requested starting level is not in the caller's unlocked set.
    #[error("level {level} is not unlocked (unlocked: {unlocked:?})")]
    InvalidLevel { level: u32, unlocked: Vec<u32> },

    /// A session is already counting down or running on this controller.
    #[error("a session is already running")]
    AlreadyRunning,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// A settings value outside its accepted range.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

pub type Result<T> = std::result::Result<T, GameError>;
