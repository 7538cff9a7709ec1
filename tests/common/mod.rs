#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use whack::config::{Settings, SettingsHandle, SettingsStore};
use whack::stats::SqliteScoreStore;
use whack::{DifficultyModel, SessionConfig, SessionController, SessionState};

pub struct FixedSettings(pub String);

impl SettingsStore for FixedSettings {
    fn load(&self) -> whack::Result<Settings> {
        Ok(Settings {
            player_name: self.0.clone(),
            ..Settings::default()
        })
    }

    fn save(&self, _settings: &Settings) -> whack::Result<()> {
        Ok(())
    }
}

/// Millisecond clock so a whole session fits in a test.
pub fn fast_config(duration_ticks: u32) -> SessionConfig {
    SessionConfig {
        duration_ticks,
        tick: Duration::from_millis(5),
        ..SessionConfig::default()
    }
}

/// Targets that stay up long enough to be tapped reliably.
pub fn steady_targets(visible_ms: f64) -> DifficultyModel {
    DifficultyModel {
        base_visible_ms: visible_ms,
        visible_floor_ms: visible_ms,
        base_gap_ms: 1.0,
        gap_floor_ms: 1.0,
        ..DifficultyModel::default()
    }
}

pub fn controller(
    config: SessionConfig,
    difficulty: DifficultyModel,
) -> (SessionController, Arc<SqliteScoreStore>) {
    let store = Arc::new(SqliteScoreStore::in_memory().unwrap());
    let settings = SettingsHandle::load(Arc::new(FixedSettings("Tester".into())));
    let controller = SessionController::new(config, difficulty, store.clone(), settings);
    (controller, store)
}

pub fn wait_for(
    controller: &SessionController,
    pred: impl Fn(&SessionState) -> bool,
) -> SessionState {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let state = controller.snapshot();
        if pred(&state) {
            return state;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting, last state: {state:?}"
        );
        thread::sleep(Duration::from_millis(1));
    }
}
