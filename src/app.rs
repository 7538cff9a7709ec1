//! Composition root: builds the collaborators once and hands them out.

use crate::app_dirs::AppDirs;
use crate::config::{FileSettingsStore, SettingsHandle};
use crate::controller::SessionController;
use crate::difficulty::{DifficultyModel, UnlockedLevels};
use crate::error::Result;
use crate::session::SessionConfig;
use crate::stats::{PersistenceGateway, SqliteScoreStore};
use std::sync::Arc;
use tracing::warn;

pub struct App {
    pub dirs: AppDirs,
    pub store: Arc<dyn PersistenceGateway>,
    pub settings: SettingsHandle,
    pub controller: SessionController,
}

impl App {
    /// Open the score database and settings under `dirs`.
    pub fn open(
        dirs: AppDirs,
        config: SessionConfig,
        difficulty: DifficultyModel,
    ) -> Result<Self> {
        let store: Arc<dyn PersistenceGateway> =
            Arc::new(SqliteScoreStore::open(dirs.db_path())?);
        let settings =
            SettingsHandle::load(Arc::new(FileSettingsStore::with_path(dirs.settings_path())));
        Ok(Self::with_parts(dirs, config, difficulty, store, settings))
    }

    pub fn with_parts(
        dirs: AppDirs,
        config: SessionConfig,
        difficulty: DifficultyModel,
        store: Arc<dyn PersistenceGateway>,
        settings: SettingsHandle,
    ) -> Self {
        let controller =
            SessionController::new(config, difficulty, Arc::clone(&store), settings.clone());
        Self {
            dirs,
            store,
            settings,
            controller,
        }
    }

    pub fn player_name(&self) -> String {
        self.settings.current().player_name
    }

    /// Starting levels open to the current player. A store that cannot be
    /// read only unlocks level 1.
    pub fn unlocked_levels(&self) -> UnlockedLevels {
        match self.store.best_score(&self.player_name()) {
            Ok(best) => UnlockedLevels::from_best_score(best),
            Err(e) => {
                warn!(error = %e, "could not read best score");
                UnlockedLevels::default()
            }
        }
    }

    /// Wipe every score and player row.
    pub fn clear_data(&self) -> Result<()> {
        self.store.delete_all_scores()?;
        self.store.delete_all_players()?;
        Ok(())
    }

    /// Wait for background writes before exit.
    pub fn shutdown(&self) {
        self.controller.reset_session();
        self.controller.flush_persistence();
        self.settings.flush();
    }
}
