use crate::error::{GameError, Result};
use crate::observe::{Broadcaster, Subscription, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub starting_level: u32,
    pub player_name: String,
    pub music_volume: f32,
    pub sfx_volume: f32,
    pub vibration_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            starting_level: 1,
            player_name: "Player".to_string(),
            music_volume: 0.5,
            sfx_volume: 0.5,
            vibration_enabled: true,
        }
    }
}

impl Settings {
    /// Bring out-of-range values back into range.
    pub fn normalized(mut self) -> Self {
        self.music_volume = clamp_volume(self.music_volume);
        self.sfx_volume = clamp_volume(self.sfx_volume);
        if self.starting_level == 0 {
            self.starting_level = 1;
        }
        let trimmed = self.player_name.trim();
        self.player_name = if trimmed.is_empty() {
            Settings::default().player_name
        } else {
            trimmed.to_string()
        };
        self
    }
}

fn clamp_volume(v: f32) -> f32 {
    if v.is_nan() {
        0.5
    } else {
        v.clamp(0.0, 1.0)
    }
}

pub fn parse_volume(raw: &str) -> Result<f32> {
    let v: f32 = raw
        .parse()
        .map_err(|_| GameError::InvalidSetting(format!("volume '{raw}' is not a number")))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(GameError::InvalidSetting(format!(
            "volume {v} is outside 0.0..=1.0"
        )));
    }
    Ok(v)
}

pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let bytes = fs::read(&self.path)?;
        Ok(serde_json::from_slice::<Settings>(&bytes)?.normalized())
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

enum WriterMsg {
    Save(Settings),
    Flush(Sender<()>),
}

/// Drain everything queued, write only the newest value, then ack flushes.
fn write_loop(store: Arc<dyn SettingsStore>, rx: Receiver<WriterMsg>) {
    while let Ok(first) = rx.recv() {
        let mut latest = None;
        let mut acks = Vec::new();
        for msg in std::iter::once(first).chain(rx.try_iter()) {
            match msg {
                WriterMsg::Save(settings) => latest = Some(settings),
                WriterMsg::Flush(ack) => acks.push(ack),
            }
        }
        if let Some(settings) = latest {
            match store.save(&settings) {
                Ok(()) => debug!("settings saved"),
                Err(e) => warn!(error = %e, "failed to save settings"),
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
    debug!("settings writer stopped");
}

/// Observable in-memory view of the settings backed by a [`SettingsStore`].
///
/// Reads never fail: a store that cannot be read yields the defaults.
/// Updates apply immediately and are written back, in order, by one writer
/// thread.
#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<SettingsInner>,
}

struct SettingsInner {
    store: Arc<dyn SettingsStore>,
    current: RwLock<Settings>,
    watchers: Broadcaster<Settings>,
    writer: Mutex<Option<Sender<WriterMsg>>>,
}

impl SettingsHandle {
    pub fn load(store: Arc<dyn SettingsStore>) -> Self {
        let current = match store.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "failed to read settings, using defaults");
                Settings::default()
            }
        };

        let (tx, rx) = mpsc::channel();
        let writer_store = Arc::clone(&store);
        let writer = match std::thread::Builder::new()
            .name("whack-settings".into())
            .spawn(move || write_loop(writer_store, rx))
        {
            Ok(_) => Some(tx),
            Err(e) => {
                warn!(error = %e, "could not start settings writer, saving inline");
                None
            }
        };

        Self {
            inner: Arc::new(SettingsInner {
                store,
                current: RwLock::new(current),
                watchers: Broadcaster::new(),
                writer: Mutex::new(writer),
            }),
        }
    }

    pub fn current(&self) -> Settings {
        self.inner
            .current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn subscribe(&self) -> Subscription<Settings> {
        self.inner.watchers.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.watchers.unsubscribe(id)
    }

    /// Apply `f` to the settings, notify watchers and queue the result for
    /// the writer.
    pub fn update<F: FnOnce(&mut Settings)>(&self, f: F) -> Settings {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(|p| p.into_inner());
        let mut next = current.clone();
        f(&mut next);
        *current = next.normalized();
        let updated = current.clone();

        // queued and published under the write lock so both see updates in order
        self.send_or_save(WriterMsg::Save(updated.clone()));
        self.inner.watchers.publish(&updated);
        drop(current);
        updated
    }

    /// Wait until every update issued so far has been written.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.send_or_save(WriterMsg::Flush(ack_tx)) {
            let _ = ack_rx.recv();
        }
    }

    /// Returns true if the message went to the writer thread.
    fn send_or_save(&self, msg: WriterMsg) -> bool {
        let mut writer = self.inner.writer.lock().unwrap_or_else(|p| p.into_inner());
        let sent = match &*writer {
            Some(tx) => tx.send(msg),
            None => Err(SendError(msg)),
        };
        let Err(SendError(msg)) = sent else {
            return true;
        };
        if writer.take().is_some() {
            warn!("settings writer is gone, saving inline");
        }
        if let WriterMsg::Save(settings) = msg {
            if let Err(e) = self.inner.store.save(&settings) {
                warn!(error = %e, "failed to save settings");
            }
        }
        false
    }
}
