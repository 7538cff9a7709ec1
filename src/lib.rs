// Library surface for the binary and for integration tests.
pub mod app;
pub mod app_dirs;
mod clock;
pub mod config;
pub mod controller;
pub mod difficulty;
pub mod error;
pub mod logging;
pub mod observe;
pub mod runtime;
pub mod score;
pub mod session;
pub mod spawner;
pub mod stats;

pub use controller::{Cue, SessionController};
pub use difficulty::{DifficultyModel, UnlockedLevels};
pub use error::{GameError, Result};
pub use score::TapOutcome;
pub use session::{Phase, SessionConfig, SessionState};
