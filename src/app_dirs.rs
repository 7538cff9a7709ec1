use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Centralized application directory resolution
#[derive(Debug, Clone)]
pub struct AppDirs {
    state_dir: PathBuf,
    config_dir: PathBuf,
}

impl AppDirs {
    /// XDG-style locations: state under `~/.local/state/whack`, settings in the
    /// platform config directory.
    pub fn discover() -> Self {
        let proj_dirs = ProjectDirs::from("", "", "whack");
        let state_dir = if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".local").join("state").join("whack")
        } else if let Some(pd) = &proj_dirs {
            pd.data_local_dir().to_path_buf()
        } else {
            PathBuf::from(".")
        };
        let config_dir = proj_dirs
            .map(|pd| pd.config_dir().to_path_buf())
            .unwrap_or_else(|| state_dir.clone());
        Self {
            state_dir,
            config_dir,
        }
    }

    /// Everything under one directory, for `--data-dir` and tests.
    pub fn rooted_at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            state_dir: root.clone(),
            config_dir: root,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("scores.db")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("whack.log")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }
}
